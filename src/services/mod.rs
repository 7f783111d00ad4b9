pub mod capacity;
pub mod constraint_model;
pub mod plan_repairer;
pub mod plan_validator;
pub mod planner_service;
pub mod prompt_templates;
pub mod provider_gateway;
pub mod sanitizer;
pub mod schedule_utils;
