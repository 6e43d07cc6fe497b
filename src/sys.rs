//! Host and process statistics.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use poise::serenity_prelude as serenity;
use serenity::CreateEmbed;
use sysinfo::{Disks, Networks, System};

use crate::utils::{progress_bar, reply_embed, requested_by, Context, Error, BLURPLE};

const BAR_WIDTH: usize = 10;

/// `1536` → `1.50 KiB`.
pub(crate) fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Whole seconds, humanised: `1day 2h 3m 4s`.
pub(crate) fn human_duration(d: Duration) -> String {
    humantime::format_duration(Duration::from_secs(d.as_secs())).to_string()
}

fn usage_line(used: u64, total: u64) -> String {
    let fraction = if total == 0 {
        0.0
    } else {
        used as f64 / total as f64
    };
    format!(
        "`{}` {:.1}%\n{} / {}",
        progress_bar(fraction, BAR_WIDTH),
        fraction * 100.0,
        human_bytes(used),
        human_bytes(total)
    )
}

fn unix(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Shows system statistics.
#[poise::command(
    prefix_command,
    category = "Utility",
    aliases("sys", "system", "about")
)]
pub(crate) async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_or_broadcast().await?;

    let mut sys = System::new_all();
    // cpu usage is a delta between two refreshes
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu();

    let cpu_usage = sys.global_cpu_info().cpu_usage();
    let cpu_brand = sys
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let process_memory = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| sys.process(pid))
        .map(|p| p.memory())
        .unwrap_or(0);

    let disks = Disks::new_with_refreshed_list();
    let (disk_total, disk_free) = disks.iter().fold((0, 0), |(total, free), d| {
        (total + d.total_space(), free + d.available_space())
    });
    let networks = Networks::new_with_refreshed_list();
    let (received, sent) = networks.iter().fold((0, 0), |(rx, tx), (_, data)| {
        (rx + data.total_received(), tx + data.total_transmitted())
    });

    let os = format!(
        "{} {}\nKernel {}",
        System::name().unwrap_or_else(|| "Unknown".into()),
        System::os_version().unwrap_or_default(),
        System::kernel_version().unwrap_or_default()
    );
    let embed = CreateEmbed::new()
        .title("📊 System Statistics")
        .colour(BLURPLE)
        .field(
            "Bot",
            format!(
                "Version {}\nUptime {}\nMemory {}",
                env!("CARGO_PKG_VERSION"),
                human_duration(ctx.data().started.elapsed()),
                human_bytes(process_memory)
            ),
            true,
        )
        .field("OS", os, true)
        .field(
            "CPU",
            format!(
                "{}\n{} cores\n`{}` {:.1}%",
                cpu_brand,
                sys.cpus().len(),
                progress_bar(f64::from(cpu_usage) / 100.0, BAR_WIDTH),
                cpu_usage
            ),
            false,
        )
        .field("Memory", usage_line(sys.used_memory(), sys.total_memory()), true)
        .field(
            "Disk",
            usage_line(disk_total.saturating_sub(disk_free), disk_total),
            true,
        )
        .field(
            "Network",
            format!("↓ {}\n↑ {}", human_bytes(received), human_bytes(sent)),
            true,
        )
        .field(
            "System Uptime",
            human_duration(Duration::from_secs(System::uptime())),
            true,
        )
        .footer(requested_by(ctx.author()));
    reply_embed(ctx, embed).await?;
    Ok(())
}

/// Shows how long the bot has been running.
#[poise::command(prefix_command, category = "Utility")]
pub(crate) async fn uptime(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let embed = CreateEmbed::new()
        .title("⏱️ Uptime")
        .colour(BLURPLE)
        .description(format!(
            "Up for **{}**\nStarted <t:{}:F>",
            human_duration(data.started.elapsed()),
            unix(data.started_at)
        ));
    reply_embed(ctx, embed).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.50 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
    }

    #[test]
    fn test_human_duration_drops_subseconds() {
        assert_eq!(human_duration(Duration::from_millis(90_500)), "1m 30s");
        assert_eq!(human_duration(Duration::from_secs(86_400 + 7)), "1day 7s");
    }

    #[test]
    fn test_usage_line_handles_zero_total() {
        assert!(usage_line(0, 0).contains("0.0%"));
        assert!(usage_line(512, 1024).contains("50.0%"));
    }
}
