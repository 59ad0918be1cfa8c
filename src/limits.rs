use crate::error::{Result, SchedulerError};
use crate::models::{Limits, Resources};

/// Check a task's resource request against a cluster's per-task hard caps.
///
/// This is a dimensional clamp on the single task, not a sum over scheduled
/// tasks. A task without a GPU type passes if any offered type has a limit
/// large enough for the requested count.
pub fn resources_meet_limits(resources: Option<&Resources>, limits: Option<&Limits>) -> Result<()> {
    let (Some(resources), Some(limits)) = (resources, limits) else {
        return Ok(());
    };

    let mut reasons = Vec::new();

    if let Some(cpu_cores) = limits.cpu_cores {
        if resources.cpu_cores > cpu_cores {
            reasons.push(format!("CPUCores should be no more than {cpu_cores}"));
        }
    }
    if let Some(ram_gb) = limits.ram_gb {
        if resources.ram_gb > ram_gb {
            reasons.push(format!("RamGB should be no more than {ram_gb:.2}"));
        }
    }

    if let (Some(gpu), Some(gpu_limit)) = (resources.gpu.as_ref(), limits.gpu_limit.as_ref()) {
        if gpu.gpu_type.is_empty() {
            let fits_some_type = gpu_limit.gpu.values().any(|&count| gpu.count <= count);
            if !fits_some_type {
                reasons.push(format!("GPUCount should fit one of {:?}", gpu_limit.gpu));
            }
        } else {
            match gpu_limit.gpu.get(&gpu.gpu_type) {
                None => reasons.push(format!("no match GPUType {}", gpu.gpu_type)),
                Some(&count) if gpu.count > count => reasons.push(format!(
                    "GPUCount of GPUType {} should be no more than {count:.2}",
                    gpu.gpu_type
                )),
                Some(_) => {}
            }
        }
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::Unschedulable(reasons.join("; ")))
    }
}
