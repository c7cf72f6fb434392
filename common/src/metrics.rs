//! レスポンスヘッダのメトリクスパーサー
//!
//! 解析サーバーは注釈付き画像を本文に、集計値をヘッダに載せて返す:
//! - `x-resumo-*`   → summary（残りを大文字化してキーにする）
//! - `x-feedback-*` → feedback（残りを小文字化し `[a-z0-9]` 以外を除去）
//!
//! どちらにも該当しないヘッダは無視する。失敗しない純粋関数。

use crate::types::{MetricMap, ResponseMetrics};

pub const SUMMARY_PREFIX: &str = "x-resumo-";
pub const FEEDBACK_PREFIX: &str = "x-feedback-";

/// ヘッダ一覧をsummary/feedbackに分解
///
/// 同じキーに正規化されるヘッダが複数ある場合は後勝ち。
///
/// # Examples
/// ```
/// use colony_counter_common::parse_response_metrics;
///
/// let headers = [
///     ("x-resumo-Total", "12"),
///     ("x-feedback-Densidade-Colonias-cm2", "0.4"),
///     ("content-type", "image/jpeg"),
/// ];
/// let metrics = parse_response_metrics(headers);
/// assert_eq!(metrics.summary["TOTAL"], "12");
/// assert_eq!(metrics.feedback["densidadecoloniascm2"], "0.4");
/// ```
pub fn parse_response_metrics<I, K, V>(headers: I) -> ResponseMetrics
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut summary = MetricMap::new();
    let mut feedback = MetricMap::new();

    for (name, value) in headers {
        let name = name.as_ref();
        let value = value.as_ref();

        if let Some(rest) = strip_prefix_ignore_case(name, SUMMARY_PREFIX) {
            summary.insert(rest.to_uppercase(), value.to_string());
        } else if let Some(rest) = strip_prefix_ignore_case(name, FEEDBACK_PREFIX) {
            feedback.insert(normalize_feedback_key(rest), value.to_string());
        }
    }

    ResponseMetrics { summary, feedback }
}

/// フィードバックキーの正規化（例: `Densidade-Colonias-cm2` → `densidadecoloniascm2`）
pub fn normalize_feedback_key(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        name.get(prefix.len()..)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_summary_key_upper_cased() {
        let metrics = parse_response_metrics([("x-resumo-total", "12"), ("X-Resumo-Amarela", "3")]);
        assert_eq!(metrics.summary.get("TOTAL").map(String::as_str), Some("12"));
        assert_eq!(metrics.summary.get("AMARELA").map(String::as_str), Some("3"));
        assert!(metrics.feedback.is_empty());
    }

    #[test]
    fn test_feedback_key_normalized() {
        let metrics = parse_response_metrics([
            ("x-feedback-Densidade-Colonias-cm2", "0.4"),
            ("X-FEEDBACK-Filtradas Area", "9"),
        ]);
        assert_eq!(metrics.feedback.get("densidadecoloniascm2").map(String::as_str), Some("0.4"));
        assert_eq!(metrics.feedback.get("filtradasarea").map(String::as_str), Some("9"));
    }

    #[test]
    fn test_unrelated_headers_ignored() {
        let metrics = parse_response_metrics([
            ("content-type", "image/jpeg"),
            ("x-resumo", "no dash"),
            ("x-feedbac-total", "typo"),
        ]);
        assert!(metrics.summary.is_empty());
        assert!(metrics.feedback.is_empty());
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let metrics = parse_response_metrics([
            ("x-feedback-Desenhadas", "1"),
            ("x-feedback-desenhadas", "2"),
        ]);
        assert_eq!(metrics.feedback.len(), 1);
        assert_eq!(metrics.feedback["desenhadas"], "2");
    }

    #[test]
    fn test_values_copied_verbatim() {
        let metrics = parse_response_metrics([("x-resumo-clara", "  7 UFC ")]);
        assert_eq!(metrics.summary["CLARA"], "  7 UFC ");
    }

    #[test]
    fn test_parse_is_deterministic() {
        let mut headers = BTreeMap::new();
        headers.insert("x-resumo-total".to_string(), "12".to_string());
        headers.insert("x-feedback-avaliadas".to_string(), "30".to_string());
        headers.insert("server".to_string(), "uvicorn".to_string());

        let first = parse_response_metrics(&headers);
        let second = parse_response_metrics(&headers);
        assert_eq!(first, second);
    }

    #[test]
    fn test_multibyte_header_name_does_not_panic() {
        let metrics = parse_response_metrics([("çççç", "1"), ("x-resumo-ção", "2")]);
        assert_eq!(metrics.summary.get("ÇÃO").map(String::as_str), Some("2"));
    }

    fn header_strategy() -> impl Strategy<Value = (String, String)> {
        let name = prop_oneof![
            "[a-zA-Z0-9 -]{0,12}".prop_map(|rest| format!("x-resumo-{}", rest)),
            "[a-zA-Z0-9 -]{0,12}".prop_map(|rest| format!("X-Feedback-{}", rest)),
            "[a-z-]{1,16}",
        ];
        (name, "[ -~]{0,8}")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// 同じ入力には同じ結果、キーは正規化済みの形になる
        #[test]
        fn prop_parse_is_deterministic(headers in proptest::collection::vec(header_strategy(), 0..16)) {
            let first = parse_response_metrics(headers.iter().cloned());
            let second = parse_response_metrics(headers.iter().cloned());
            prop_assert_eq!(&first, &second);

            for key in first.summary.keys() {
                prop_assert_eq!(key, &key.to_uppercase());
            }
            for key in first.feedback.keys() {
                prop_assert_eq!(key, &normalize_feedback_key(key));
            }
            prop_assert!(first.summary.len() + first.feedback.len() <= headers.len());
        }

        #[test]
        fn prop_normalize_is_idempotent(raw in "\\PC{0,24}") {
            let once = normalize_feedback_key(&raw);
            prop_assert_eq!(normalize_feedback_key(&once), once.clone());
            prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }
}
