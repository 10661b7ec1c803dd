use std::sync::Arc;

use anyhow::Context;
use nodescale_core::ScaleConfig;
use nodescale_engine::{Direction, InventoryExport, PlannedScale, Planner, ScaleRequest};
use nodescale_state::ModelStore;
use tracing::info;

use crate::{OutputFormat, PlanArgs};

pub async fn run(args: PlanArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => ScaleConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ScaleConfig::default(),
    };
    let settings = config.settings()?;

    let inventory = InventoryExport::from_file(&args.inventory)?;
    info!(
        virtual_machines = inventory.virtual_machines.len(),
        scale_sets = inventory.scale_sets.len(),
        "inventory export loaded"
    );

    let planner = Planner::new(Arc::new(inventory), ModelStore::new(&args.api_model))
        .with_settings(settings);
    let request = ScaleRequest {
        pool: args.node_pool,
        desired_count: args.new_node_count,
        subscription_id: String::new(),
        resource_group: args.resource_group,
        location: args.location,
        drain_endpoint: None,
    };

    let planned = planner
        .plan(&request)
        .await
        .with_context(|| format!("failed to plan scale of {}", args.api_model.display()))?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&planned.plan)?),
        OutputFormat::Text => print!("{}", format_plan(&planned)),
    }
    Ok(())
}

fn format_plan(planned: &PlannedScale) -> String {
    let plan = &planned.plan;
    let pool = &planned.pool;
    let mut out = format!(
        "Pool {} ({:?}, {:?})\n  current: {}\n  desired: {}\n",
        pool.name,
        pool.aggregation(),
        pool.os_type(),
        plan.current_count,
        plan.desired_count
    );

    match plan.direction {
        Direction::NoOp => out.push_str("  nothing to do\n"),
        Direction::ScaleDown if plan.to_remove.is_empty() => {
            out.push_str(&format!("  shrink scale set to {}\n", plan.template_count));
        }
        Direction::ScaleDown => {
            out.push_str("  drain and delete:\n");
            for vm in &plan.to_remove {
                out.push_str(&format!("    - {vm}\n"));
            }
        }
        Direction::ScaleUp => {
            out.push_str(&format!("  template count: {}\n", plan.template_count));
            if let Some(offset) = plan.index_offset {
                out.push_str(&format!("  new node indices start at: {offset}\n"));
            }
        }
    }
    out
}
