use anyhow::{Context, Result};

use slotroster::config::Config;
use slotroster::error::{Error, RosterErrorTrait};
use slotroster::provider::{PlanSource, ProviderClient};
use slotroster::scheduler::{RefreshKind, SchedulerService};

/// Refresh once and list upcoming plans
pub async fn plans(config: Config, group: Option<String>, json: bool) -> Result<()> {
    let service = refreshed_service(&config).await?;

    let views: Vec<_> = service
        .list_upcoming_plans()
        .await
        .into_iter()
        .filter(|view| group.as_deref().map_or(true, |g| view.plan.group_id == g))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("Upcoming Plans");
    println!("==============");
    if views.is_empty() {
        println!("No upcoming plans");
    }

    for view in &views {
        let plan = &view.plan;
        let marker = match (view.is_live, view.is_manual) {
            (true, _) => " [LIVE]",
            (false, true) => " [MANUAL]",
            _ => "",
        };
        println!("\n{} - {} ({}){}", plan.group_name, plan.title, plan.plan_id, marker);
        println!("  Dates: {}", plan.date_label);
        println!("  First service: {}", plan.earliest_service_time.to_rfc3339());
        println!(
            "  Live window: {} .. {}",
            plan.live_window_start.to_rfc3339(),
            plan.live_window_end.to_rfc3339()
        );
        for (slot, name) in &plan.slot_assignments {
            println!("  Slot {slot:>2}: {name}");
        }
    }

    Ok(())
}

/// Refresh once and print the active plan's slots
pub async fn active(config: Config, plan: Option<String>, json: bool) -> Result<()> {
    let service = refreshed_service(&config).await?;

    if let Some(plan_id) = plan {
        service
            .set_manual_plan(&plan_id)
            .await
            .with_context(|| format!("Cannot select plan {plan_id}"))?;
    }

    let Some(active) = service.get_active_plan().await else {
        println!("No plan is live and none was selected");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&active)?);
        return Ok(());
    }

    println!(
        "Active plan: {} - {} ({}, {:?})",
        active.plan.group_name, active.plan.title, active.plan.plan_id, active.source
    );
    service
        .apply_active_plan(&|slot: u32, name: &str| {
            let shown = if name.is_empty() { "-" } else { name };
            println!("  Slot {slot:>2}: {shown}");
        })
        .await;

    Ok(())
}

/// List a group's teams and their positions
pub async fn teams(config: Config, group: String) -> Result<()> {
    config.validate()?;
    if config.provider.credentials().is_none() {
        anyhow::bail!("provider credentials are not set");
    }

    let client = ProviderClient::new(&config.provider).context("Failed to create provider client")?;
    let teams = client
        .teams(&group)
        .await
        .with_context(|| format!("Failed to fetch teams of group {group}"))?;

    println!("Teams of group {group}");
    println!("====================");
    if teams.is_empty() {
        println!("No teams found");
    }

    for team in teams {
        println!("\n{} (team_id = {})", team.name, team.id);
        match client.team_positions(&group, &team.id).await {
            Ok(positions) => {
                for position in positions {
                    println!("  {} (position_id = {})", position.name, position.id);
                }
            }
            Err(e) => {
                tracing::warn!(team_id = %team.id, error = %e, "Failed to fetch team positions");
                println!("  (positions unavailable: {e})");
            }
        }
    }

    Ok(())
}

/// Validate the configuration and print a summary
pub async fn check_config(config: Config) -> Result<()> {
    config.validate()?;

    println!("Configuration");
    println!("=============");
    println!("  Provider: {}", config.provider.base_url);
    println!(
        "  Credentials: {}",
        if config.provider.credentials().is_some() { "set" } else { "missing" }
    );
    println!(
        "  Rate limit: {} requests / {}s",
        config.provider.rate_limit, config.provider.rate_window_secs
    );
    println!("  Slots: {}", config.scheduler.slot_count);
    println!("  Day boundary: {:?}", config.scheduler.day_boundary());
    println!("  Global rules: {}", config.global_rules.len());

    for group in &config.groups {
        println!(
            "  Group {} ({}): lead {}h, {} rules",
            group.id,
            group.display_name(),
            group.lead_time_hours,
            group.rules.len()
        );
    }

    let service = SchedulerService::from_config(&config).context("Failed to create provider client")?;
    match service.check_configuration().await {
        Ok(()) => println!("\nConfiguration OK"),
        Err(e) => println!("\nScheduler will stay idle: {e}"),
    }

    Ok(())
}

async fn refreshed_service(config: &Config) -> Result<SchedulerService> {
    config.validate()?;
    let service = SchedulerService::from_config(config).context("Failed to create provider client")?;
    let report = match service.refresh(RefreshKind::Startup).await {
        Ok(report) => report,
        Err(e) => {
            let err = Error::from(e);
            tracing::error!(
                category = err.category().as_str(),
                recoverable = err.is_recoverable(),
                error = %err,
                "Refresh skipped"
            );
            return Err(err.into());
        }
    };

    if !report.is_complete() {
        tracing::warn!(failed = ?report.failed_groups, "Some groups could not be refreshed");
    }

    Ok(service)
}
