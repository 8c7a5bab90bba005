pub mod service;

pub use service::{
    Actor, NewOvertimeRequest, OvertimeEditInput, OvertimeWorkflowService, WorkflowSettings,
};
