// 💡 Insight Derivation - headline metrics from the cleaned set + query results
// Plus the plain-text / JSON report writers

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::db::Transaction;
use crate::queries::{CustomerMixRow, QueryResults, RevenueRow};

/// Separator between category prefix and product name in descriptions
pub const CATEGORY_SEPARATOR: char = '_';

// ============================================================================
// INSIGHT SET
// ============================================================================

/// Headline metrics. `None` means the prerequisite result was empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightSet {
    pub total_revenue: f64,
    pub best_month: Option<String>,
    pub best_month_revenue: Option<f64>,
    pub top_country: Option<String>,
    pub top_country_revenue: Option<f64>,
    pub repeat_customer_pct: f64,
    pub average_order_value: Option<f64>,
    pub top_category: Option<String>,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sum of `total_price` over the whole cleaned set
pub fn total_revenue(transactions: &[Transaction]) -> f64 {
    round2(transactions.iter().map(|t| t.total_price).sum())
}

/// Highest-revenue month; the earliest month wins a tie
pub fn best_month(monthly: &[RevenueRow]) -> Option<&RevenueRow> {
    let mut best: Option<&RevenueRow> = None;
    for row in monthly {
        match best {
            Some(current) if row.revenue <= current.revenue => {}
            _ => best = Some(row),
        }
    }
    best
}

/// First row of the already-descending country ranking
pub fn top_country(by_country: &[RevenueRow]) -> Option<&RevenueRow> {
    by_country.first()
}

/// Share of customers with more than one distinct invoice, 0 when there are none
pub fn repeat_customer_pct(mix: &[CustomerMixRow]) -> f64 {
    let total: i64 = mix.iter().map(|row| row.customer_count).sum();
    if total == 0 {
        return 0.0;
    }

    let repeat: i64 = mix
        .iter()
        .filter(|row| row.customer_type == "Repeat")
        .map(|row| row.customer_count)
        .sum();
    round2(100.0 * repeat as f64 / total as f64)
}

/// Category label: the description up to its first separator
pub fn category_of(description: &str) -> &str {
    description
        .split(CATEGORY_SEPARATOR)
        .next()
        .unwrap_or(description)
}

/// Category with the most transactions (by count, not revenue)
///
/// Ties go to whichever category appeared first.
pub fn top_category<'a, I>(descriptions: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for description in descriptions {
        let category = category_of(description);
        let count = counts.entry(category).or_insert(0);
        if *count == 0 {
            order.push(category);
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for category in order {
        let count = counts[category];
        if best.map_or(true, |(_, n)| count > n) {
            best = Some((category, count));
        }
    }

    best.map(|(category, _)| category.to_string())
}

pub fn derive_insights(transactions: &[Transaction], results: &QueryResults) -> InsightSet {
    let best = best_month(&results.monthly_revenue_trend);
    let country = top_country(&results.revenue_by_country);

    InsightSet {
        total_revenue: total_revenue(transactions),
        best_month: best.map(|row| row.key.clone()),
        best_month_revenue: best.map(|row| row.revenue),
        top_country: country.map(|row| row.key.clone()),
        top_country_revenue: country.map(|row| row.revenue),
        repeat_customer_pct: repeat_customer_pct(&results.repeat_vs_new_customers),
        average_order_value: results.average_order_value,
        top_category: top_category(transactions.iter().map(|t| t.description.as_str())),
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// `1234567.891` → `1,234,567.89`
pub fn format_money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

fn money_or_na(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("${}", format_money(v)))
}

pub fn render_report(insights: &InsightSet, generated_at: NaiveDateTime) -> String {
    let best_month = match (&insights.best_month, insights.best_month_revenue) {
        (Some(month), revenue) => format!("{} ({})", month, money_or_na(revenue)),
        _ => "n/a".to_string(),
    };
    let top_country = match (&insights.top_country, insights.top_country_revenue) {
        (Some(country), revenue) => format!("{} ({})", country, money_or_na(revenue)),
        _ => "n/a".to_string(),
    };

    let lines = [
        "E-commerce Business Insights".to_string(),
        format!("Generated on: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        String::new(),
        format!("- Total revenue: ${}", format_money(insights.total_revenue)),
        format!("- Best month by revenue: {}", best_month),
        format!("- Top country by revenue: {}", top_country),
        format!("- Repeat customers: {:.2}% of customers", insights.repeat_customer_pct),
        format!("- Average order value: {}", money_or_na(insights.average_order_value)),
        format!(
            "- Top product category (by transaction count): {}",
            insights.top_category.as_deref().unwrap_or("n/a")
        ),
    ];

    lines.join("\n")
}

pub fn write_report(insights: &InsightSet, text_path: &Path, json_path: &Path) -> Result<()> {
    let now = chrono::Local::now().naive_local();
    std::fs::write(text_path, render_report(insights, now))
        .with_context(|| format!("Failed to write insights: {}", text_path.display()))?;

    let json = serde_json::to_string_pretty(insights)?;
    std::fs::write(json_path, json)
        .with_context(|| format!("Failed to write insights: {}", json_path.display()))?;

    log::info!("💡 Insights saved: {}", text_path.display());
    Ok(())
}
