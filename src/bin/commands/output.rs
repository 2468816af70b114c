use super::utils::format_duration;
use chrono::Weekday;
use serde::Serialize;
use spotify_history::insights::{
    completion_breakdown, end_reason_breakdown, hour_of_day_profile, weekday_profile,
    DEFAULT_COMPLETION_THRESHOLD_MS,
};
use spotify_history::{
    CompletionBreakdown, Granularity, GroupBy, IngestReport, ListeningOverview, Metric, PlayEvent,
    Summary, TrendPoint,
};

/// Everything the overview command shows, for JSON output
#[derive(Debug, Serialize)]
pub struct OverviewReport {
    pub overview: ListeningOverview,
    pub plays_by_hour: [usize; 24],
    pub plays_by_weekday: Vec<(Weekday, usize)>,
    pub completion: CompletionBreakdown,
    pub end_reasons: Vec<(String, usize)>,
}

impl OverviewReport {
    pub fn new(overview: ListeningOverview, events: &[PlayEvent]) -> Self {
        Self {
            overview,
            plays_by_hour: hour_of_day_profile(events),
            plays_by_weekday: weekday_profile(events),
            completion: completion_breakdown(events, DEFAULT_COMPLETION_THRESHOLD_MS),
            end_reasons: end_reason_breakdown(events),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Log how many rows made it through normalization
pub fn log_ingest(report: &IngestReport) {
    log::info!(
        "Loaded {} plays from {} rows",
        report.events.len(),
        report.total_rows
    );
    if report.has_skipped_rows() {
        println!(
            "⚠️  Skipped {} row{} ({} missing a required field, {} with an unreadable timestamp)",
            report.skipped_count,
            if report.skipped_count == 1 { "" } else { "s" },
            report.missing_field_count,
            report.invalid_timestamp_count
        );
    }
    if report.filtered_count > 0 {
        println!(
            "🔇 Ignored {} play{} shorter than the minimum length",
            report.filtered_count,
            if report.filtered_count == 1 { "" } else { "s" }
        );
    }
}

pub fn print_ranking(summary: &Summary) {
    let request = &summary.request;
    let what = match request.group_by {
        GroupBy::Track => "tracks",
        GroupBy::Artist => "artists",
    };
    let by = match request.metric {
        Metric::Plays => "play count",
        Metric::Duration => "listening time",
    };

    if summary.ranking.is_empty() {
        println!("No plays to rank");
        return;
    }

    println!("🏆 Top {} {what} by {by}", summary.ranking.len());
    for (index, entry) in summary.ranking.iter().enumerate() {
        let mut line = format!(
            "{:>3}. {entry} ({} play{}, {})",
            index + 1,
            entry.play_count,
            if entry.play_count == 1 { "" } else { "s" },
            format_duration(entry.total_duration_ms)
        );
        if entry.unknown_duration_plays > 0 {
            line.push_str(&format!(
                " [{} without duration]",
                entry.unknown_duration_plays
            ));
        }
        println!("{line}");
    }
}

pub fn print_trend(points: &[TrendPoint], granularity: Granularity) {
    if points.is_empty() {
        println!("No plays in any {granularity}");
        return;
    }

    let date_format = match granularity {
        Granularity::Month => "%Y-%m",
        _ => "%Y-%m-%d",
    };
    let widest = points.iter().map(|p| p.play_count).max().unwrap_or(1).max(1);

    println!("📈 Plays per {granularity}");
    for point in points {
        let bar = "█".repeat((point.play_count * 40).div_ceil(widest));
        println!(
            "  {}  {:>5}  {:>8}  {bar}",
            point.bucket_start.format(date_format),
            point.play_count,
            format_duration(point.total_duration_ms)
        );
    }
}

pub fn print_overview(report: &OverviewReport) {
    let overview = &report.overview;
    println!("🎧 Listening overview");
    println!("  Plays:          {}", overview.total_plays);
    println!("  Unique tracks:  {}", overview.unique_tracks);
    println!("  Unique artists: {}", overview.unique_artists);
    println!(
        "  Listening time: {}",
        format_duration(overview.total_duration_ms)
    );
    println!(
        "  Active days:    {} ({:.1} plays per day)",
        overview.active_days, overview.average_daily_plays
    );
    if let Some(average) = overview.average_play_ms {
        println!("  Average play:   {}", format_duration(average as u64));
    }
    if let (Some(first), Some(last)) = (overview.first_played_at, overview.last_played_at) {
        println!(
            "  Period:         {} to {}",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        );
    }
    if let Some((artist, plays)) = &overview.top_artist {
        println!("  Top artist:     {artist} ({plays} plays)");
    }
    if let Some(hour) = overview.most_active_hour {
        println!("  Busiest hour:   {hour:02}:00 UTC");
    }

    if overview.total_plays == 0 {
        return;
    }

    println!();
    println!("📅 Plays by weekday");
    for (weekday, count) in &report.plays_by_weekday {
        println!("  {weekday}  {count}");
    }

    let completion = &report.completion;
    if let Some(rate) = completion.completion_rate() {
        println!();
        println!(
            "✅ {:.0}% of plays lasted at least {} ({} completed, {} shorter)",
            rate * 100.0,
            format_duration(DEFAULT_COMPLETION_THRESHOLD_MS),
            completion.completed,
            completion.skipped
        );
    }

    if !report.end_reasons.is_empty() {
        println!();
        println!("⏹️  How plays ended");
        for (reason, count) in &report.end_reasons {
            println!("  {reason:<12} {count}");
        }
    }
}
