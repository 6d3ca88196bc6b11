use crate::types::ProbeVerdict;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_probed: usize,
    pub pay_per_crawl_found: usize,
    pub cloudflare_detected: usize,
    pub errors: usize,
    pub average_response_time_ms: u64,
}

impl BatchSummary {
    pub fn from_verdicts(verdicts: &[ProbeVerdict]) -> Self {
        let total_ms: u128 = verdicts.iter().map(|v| u128::from(v.response_time_ms())).sum();
        let count = verdicts.len() as u128;
        let average = if count == 0 {
            0
        } else {
            (total_ms + count / 2) / count
        };

        Self {
            total_probed: verdicts.len(),
            pay_per_crawl_found: verdicts.iter().filter(|v| v.has_pay_per_crawl()).count(),
            cloudflare_detected: verdicts.iter().filter(|v| v.is_cloudflare_like()).count(),
            errors: verdicts.iter().filter(|v| v.is_error()).count(),
            average_response_time_ms: u64::try_from(average).unwrap_or(u64::MAX),
        }
    }
}

/// Everything a caller needs after a batch: the counts, every verdict, and
/// the subset that asked for payment.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub results: Vec<ProbeVerdict>,
    pub discovered: Vec<ProbeVerdict>,
}

impl BatchReport {
    pub fn new(results: Vec<ProbeVerdict>) -> Self {
        let summary = BatchSummary::from_verdicts(&results);
        let discovered = results
            .iter()
            .filter(|v| v.has_pay_per_crawl())
            .cloned()
            .collect();
        Self {
            summary,
            results,
            discovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PayPerCrawl, ResponseSignals};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn responded(domain: &str, ms: u64, cdn: bool, charges: bool) -> ProbeVerdict {
        ProbeVerdict::responded(
            domain.to_string(),
            format!("https://{}", domain),
            ResponseSignals {
                http_status: if charges { 402 } else { 200 },
                headers: BTreeMap::new(),
                is_cloudflare_like: cdn,
                pay_per_crawl: charges.then_some(PayPerCrawl { price: None }),
            },
            Duration::from_millis(ms),
        )
    }

    fn failed(domain: &str, ms: u64) -> ProbeVerdict {
        ProbeVerdict::failed(
            domain.to_string(),
            format!("https://{}", domain),
            "Connection failed: refused",
            Duration::from_millis(ms),
        )
    }

    #[test]
    fn empty_batch_has_zero_average() {
        let summary = BatchSummary::from_verdicts(&[]);

        assert_eq!(summary, BatchSummary::default());
        assert_eq!(summary.average_response_time_ms, 0);
    }

    #[test]
    fn counts_each_category() {
        let verdicts = vec![
            responded("a.example", 100, true, true),
            responded("b.example", 200, true, false),
            responded("c.example", 300, false, false),
            failed("d.example", 1000),
        ];

        let summary = BatchSummary::from_verdicts(&verdicts);

        assert_eq!(summary.total_probed, 4);
        assert_eq!(summary.pay_per_crawl_found, 1);
        assert_eq!(summary.cloudflare_detected, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.average_response_time_ms, 400);
    }

    #[test]
    fn average_rounds_to_nearest_millisecond() {
        let verdicts = vec![responded("a.example", 1, false, false), responded("b.example", 2, false, false)];

        assert_eq!(BatchSummary::from_verdicts(&verdicts).average_response_time_ms, 2);
    }

    #[test]
    fn report_lists_discoveries() {
        let report = BatchReport::new(vec![
            responded("paid.example", 10, true, true),
            responded("free.example", 10, false, false),
        ]);

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.discovered.len(), 1);
        assert_eq!(report.discovered[0].domain(), "paid.example");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["payPerCrawlFound"], 1);
        assert_eq!(json["discovered"][0]["domain"], "paid.example");
    }
}
