use console::{style, StyledObject};
use lib402_storm::{BatchReport, BatchSummary, ProbeVerdict};

fn status_cell(verdict: &ProbeVerdict) -> StyledObject<String> {
    match verdict.http_status() {
        0 => style("ERR".to_string()).magenta().bold(),
        402 => style("402".to_string()).yellow().bold(),
        code @ 200..=399 => style(code.to_string()).green(),
        code => style(code.to_string()).red(),
    }
}

fn price_cell(verdict: &ProbeVerdict) -> String {
    match (verdict.price_per_request(), verdict.currency()) {
        (Some(amount), Some(currency)) => format!("{} {}", amount, currency),
        _ if verdict.has_pay_per_crawl() => "unpriced".to_string(),
        _ => "-".to_string(),
    }
}

fn detail_cell(verdict: &ProbeVerdict) -> String {
    if let Some(err) = verdict.error() {
        return err.to_string();
    }
    let mut flags = Vec::new();
    if verdict.has_pay_per_crawl() {
        flags.push("pay-per-crawl");
    }
    if verdict.is_cloudflare_like() {
        flags.push("cdn");
    }
    flags.join(", ")
}

pub fn format_row(verdict: &ProbeVerdict) -> String {
    let symbol = if verdict.is_error() {
        style("!").magenta().bold()
    } else if verdict.has_pay_per_crawl() {
        style("$").yellow().bold()
    } else {
        style("·").dim()
    };

    format!(
        "{} {:<40} {:>5} {:>14} {:>7}ms  {}",
        symbol,
        style(verdict.domain()).cyan(),
        status_cell(verdict),
        price_cell(verdict),
        verdict.response_time_ms(),
        style(detail_cell(verdict)).dim()
    )
}

pub fn format_summary(summary: &BatchSummary) -> String {
    format!(
        "{} probed, {} pay-per-crawl, {} behind CDN, {} errors, avg {} ms",
        summary.total_probed,
        style(summary.pay_per_crawl_found).yellow().bold(),
        summary.cloudflare_detected,
        style(summary.errors).magenta(),
        summary.average_response_time_ms
    )
}

pub fn print_report(report: &BatchReport) {
    let mut rows: Vec<&ProbeVerdict> = report.results.iter().collect();
    rows.sort_by(|a, b| {
        b.has_pay_per_crawl()
            .cmp(&a.has_pay_per_crawl())
            .then_with(|| a.is_error().cmp(&b.is_error()))
            .then_with(|| a.domain().cmp(b.domain()))
    });

    for verdict in rows {
        println!("{}", format_row(verdict));
    }
    println!();
    println!("{}", format_summary(&report.summary));
}
