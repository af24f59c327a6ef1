//! Tasks command handler.

use comstore_runtime::{QueueManager, TaskDescriptor, TaskManager};

use crate::bootstrap::CliContext;

/// Descriptors of the built-in tasks, in registration order.
pub fn descriptors(ctx: &CliContext) -> Vec<TaskDescriptor> {
    let mut tasks = TaskManager::new(ctx.app().clone(), QueueManager::new());
    tasks.load();
    tasks
        .names()
        .into_iter()
        .filter_map(|name| tasks.get(name).map(|t| t.descriptor().clone()))
        .collect()
}

fn describe(descriptor: &TaskDescriptor) -> String {
    let mut parts = Vec::new();
    if !descriptor.stages.is_empty() {
        let stages: Vec<&str> = descriptor.stages.iter().map(|s| s.as_str()).collect();
        parts.push(format!("stage {}", stages.join("/")));
    }
    if let Some(interval) = descriptor.interval {
        parts.push(format!("every {} min", interval.as_secs() / 60));
    }
    for event in descriptor.events {
        parts.push(format!("on {event:?}").to_lowercase());
    }
    if descriptor.runs_when_disabled {
        parts.push("runs while disabled".to_string());
    }
    parts.join(", ")
}

/// Execute the tasks command.
pub fn execute(ctx: &CliContext) {
    for descriptor in descriptors(ctx) {
        println!("{:<32} {}", descriptor.name, describe(&descriptor));
    }
}
