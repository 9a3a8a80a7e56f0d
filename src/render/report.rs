// Page layouts for each report type

use chrono::{DateTime, Utc};

use super::chart::{bar_chart, series_color, CHART_HEIGHT, CHART_WIDTH};
use super::pdf::{Column, Font, PdfWriter, CONTENT_WIDTH, MUTED, TEXT};
use crate::models::{
    CategoryCount, CommunityActivityData, FinancialReportData, ParticipantDemographicsData,
    ProgramImpactData, ReportPayload,
};
use crate::types::WorkerResult;

const MAX_LISTED_DOCUMENTS: usize = 4;

pub fn render_payload(
    payload: &ReportPayload,
    org_name: &str,
    generated_at: DateTime<Utc>,
) -> WorkerResult<Vec<u8>> {
    let mut writer = PdfWriter::new(generated_at);
    let title = payload.report_type().title();

    match payload {
        ReportPayload::CommunityActivity(data) => community_activity(&mut writer, org_name, title, data),
        ReportPayload::ParticipantDemographics(data) => {
            participant_demographics(&mut writer, org_name, title, data)?
        }
        ReportPayload::ProgramImpact(data) => program_impact(&mut writer, org_name, title, data)?,
        ReportPayload::FinancialSummary(data) => financial_summary(&mut writer, org_name, title, data)?,
    }

    writer.finish()
}

fn community_activity(writer: &mut PdfWriter, org_name: &str, title: &str, data: &CommunityActivityData) {
    writer.header(
        org_name,
        title,
        &[
            format!("Community: {}", data.community_name),
            period(data.start_date, data.end_date),
        ],
    );

    writer.heading("Performance Summary");
    writer.cards(&[
        ("New Members", format!("{} People", data.new_member_count)),
        ("Active Members", format!("{} People", data.active_member_count)),
        ("Total Events", format!("{} Events", data.events.len())),
    ]);

    writer.heading("Event Details & Documentation");
    if data.events.is_empty() {
        writer.paragraph("No events were held in this period.", Font::Italic, MUTED);
        return;
    }

    for (i, event) in data.events.iter().enumerate() {
        writer.paragraph(&format!("{}. {}", i + 1, event.name), Font::Bold, TEXT);
        writer.paragraph(
            &format!(
                "Date: {}   |   Tutor: {}   |   Participants: {}",
                event.date.format("%A, %d %b %Y"),
                event.tutor_name,
                event.participant_count
            ),
            Font::Regular,
            MUTED,
        );

        if event.documentation_urls.is_empty() {
            writer.paragraph("(No photo documentation)", Font::Italic, MUTED);
        } else {
            for url in event.documentation_urls.iter().take(MAX_LISTED_DOCUMENTS) {
                writer.bullet(url);
            }
            let hidden = event.documentation_urls.len().saturating_sub(MAX_LISTED_DOCUMENTS);
            if hidden > 0 {
                writer.paragraph(
                    &format!("(+{} more documentation photos)", hidden),
                    Font::Italic,
                    MUTED,
                );
            }
        }
        writer.spacer(8.0);
    }
}

fn participant_demographics(
    writer: &mut PdfWriter,
    org_name: &str,
    title: &str,
    data: &ParticipantDemographicsData,
) -> WorkerResult<()> {
    writer.header(
        org_name,
        title,
        &[
            format!("Community: {}", data.community_name),
            format!("Total Participants: {}", data.total_participants),
        ],
    );

    writer.heading("Report Snapshot");
    writer.cards(&[
        ("Total Participants", format!("{} People", data.total_participants)),
        ("Statuses Tracked", format!("{} Segments", data.by_status.len())),
        ("Locations Tracked", format!("{} Regions", data.by_location.len())),
    ]);

    let total = data.total_participants as f64;
    for (heading, stats) in [
        ("By Employment Status", &data.by_status),
        ("By Age Group", &data.by_age),
        ("By Location (Top 10)", &data.by_location),
    ] {
        writer.heading(heading);
        if stats.is_empty() {
            writer.paragraph("No data recorded.", Font::Italic, MUTED);
            continue;
        }
        let rows = counts(stats);
        breakdown(writer, &rows, total, |v| format!("{}", v as i64))?;
    }
    Ok(())
}

fn program_impact(
    writer: &mut PdfWriter,
    org_name: &str,
    title: &str,
    data: &ProgramImpactData,
) -> WorkerResult<()> {
    writer.header(
        org_name,
        title,
        &[
            format!("Community: {}", data.community_name),
            period(data.start_date, data.end_date),
        ],
    );

    writer.heading("Participant Milestones");
    if data.stats.is_empty() {
        writer.paragraph("No milestones were recorded in this period.", Font::Italic, MUTED);
    } else {
        for stat in &data.stats {
            writer.key_value(milestone_label(&stat.label), &stat.count.to_string(), false);
        }
        let rows: Vec<(String, f64)> = data
            .stats
            .iter()
            .map(|s| (milestone_label(&s.label).to_string(), s.count as f64))
            .collect();
        let total: f64 = rows.iter().map(|(_, v)| v).sum();
        breakdown(writer, &rows, total, |v| format!("{}", v as i64))?;
    }

    writer.heading("Project Highlights");
    if data.highlights.is_empty() {
        writer.paragraph("No project highlights in this period.", Font::Italic, MUTED);
    }
    for highlight in &data.highlights {
        writer.paragraph(&highlight.title, Font::Bold, TEXT);
        writer.paragraph(
            &format!("by {}  |  {}", highlight.owner_name, highlight.date.format("%d %b %Y")),
            Font::Regular,
            MUTED,
        );
        if !highlight.summary.trim().is_empty() {
            writer.paragraph(&highlight.summary, Font::Regular, TEXT);
        }
        writer.spacer(6.0);
    }
    Ok(())
}

fn financial_summary(
    writer: &mut PdfWriter,
    org_name: &str,
    title: &str,
    data: &FinancialReportData,
) -> WorkerResult<()> {
    writer.header(org_name, title, &[period(data.start_date, data.end_date)]);

    writer.heading("Financial Summary");
    writer.key_value("Total Income", &format_currency(data.total_income), false);
    if data.total_in_kind_value > 0.0 {
        writer.key_value("In-Kind Donation Value", &format_currency(data.total_in_kind_value), false);
    }
    writer.key_value("Total Expenses", &format_currency(data.total_expenses), false);
    writer.key_value("Net Income", &format_currency(data.net_income), true);

    writer.heading("Expense Allocation");
    if data.total_expenses > 0.0 {
        let rows: Vec<(String, f64)> = data
            .expenses_by_category
            .iter()
            .map(|c| (c.label.clone(), c.total))
            .collect();
        breakdown(writer, &rows, data.total_expenses, format_currency)?;
    } else {
        writer.paragraph("No expenses were recorded in this period.", Font::Italic, MUTED);
    }

    writer.heading("Income by Source");
    if data.income_by_source.is_empty() {
        writer.paragraph("No income was recorded in this period.", Font::Italic, MUTED);
    } else {
        let rows: Vec<Vec<String>> = data
            .income_by_source
            .iter()
            .map(|s| vec![s.label.clone(), format_currency(s.total)])
            .collect();
        writer.table(
            &[Column::left("Source", CONTENT_WIDTH * 0.6), Column::right("Amount", CONTENT_WIDTH * 0.4)],
            &rows,
        );
    }

    writer.heading("Top 5 Donations");
    if data.top_donations.is_empty() {
        writer.paragraph("No cash donations in this period.", Font::Italic, MUTED);
    } else {
        let rows: Vec<Vec<String>> = data
            .top_donations
            .iter()
            .map(|d| {
                vec![
                    d.source.clone(),
                    d.date.format("%d %b %Y").to_string(),
                    format_currency(d.amount),
                ]
            })
            .collect();
        writer.table(
            &[
                Column::left("Source", CONTENT_WIDTH * 0.45),
                Column::left("Date", CONTENT_WIDTH * 0.25),
                Column::right("Amount", CONTENT_WIDTH * 0.30),
            ],
            &rows,
        );
    }
    Ok(())
}

/// Chart plus a legend line per category with its share of `total`.
fn breakdown(
    writer: &mut PdfWriter,
    rows: &[(String, f64)],
    total: f64,
    format_value: impl Fn(f64) -> String,
) -> WorkerResult<()> {
    let values: Vec<f64> = rows.iter().map(|(_, v)| *v).collect();
    if let Some(chart) = bar_chart(&values, CHART_WIDTH, CHART_HEIGHT)? {
        writer.image(chart, CONTENT_WIDTH);
    }

    let legend: Vec<_> = rows
        .iter()
        .enumerate()
        .map(|(i, (label, value))| {
            let label = if label.trim().is_empty() { "Not Specified" } else { label.as_str() };
            (
                series_color(i),
                format!("{}: {} ({:.1}%)", label, format_value(*value), percentage(*value, total)),
            )
        })
        .collect();
    writer.legend(&legend);
    Ok(())
}

fn counts(stats: &[CategoryCount]) -> Vec<(String, f64)> {
    stats.iter().map(|s| (s.label.clone(), s.count as f64)).collect()
}

fn percentage(value: f64, total: f64) -> f64 {
    if total > 0.0 {
        value / total * 100.0
    } else {
        0.0
    }
}

fn period(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("Period: {} - {}", start.format("%d %b %Y"), end.format("%d %b %Y"))
}

fn milestone_label(kind: &str) -> &str {
    match kind {
        "project_submitted" => "Final Projects Submitted",
        "level_up" => "Participants Levelled Up",
        "job_placement" => "Participants Placed in Jobs",
        other => other,
    }
}

/// Rupiah with `.` thousands separators and no decimals, e.g. `Rp 1.234.567`.
pub fn format_currency(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if rounded < 0.0 {
        format!("Rp -{}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}
