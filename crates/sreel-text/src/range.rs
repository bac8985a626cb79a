//! 1-based segment range selection.
//!
//! Accepts specs like `"3"`, `"1-5"`, `"2,4-6"`. Chinese punctuation
//! is tolerated, a lone number means "first N", out-of-range upper
//! bounds are clipped, and reversed ranges are accepted.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid segment range token: {0}")]
    InvalidToken(String),

    #[error("Segment range is 1-based; values must be >= 1")]
    NonPositive,
}

/// Apply a range spec to a segment vector. Empty or missing specs
/// return all segments.
pub fn select_segments_by_range(
    segments: &[String],
    range_spec: Option<&str>,
) -> Result<Vec<String>, RangeError> {
    let raw = range_spec.unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(segments.to_vec());
    }

    let normalized: String = raw
        .chars()
        .map(|c| match c {
            '，' | '；' | ';' => ',',
            '～' | '~' | '—' | '–' | '到' => '-',
            other => other,
        })
        .collect();

    let parts: Vec<&str> = normalized
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return Ok(segments.to_vec());
    }

    let total = segments.len();
    let single_token_mode = parts.len() == 1;
    let mut selected: Vec<String> = Vec::new();
    let mut selected_indexes: std::collections::HashSet<usize> = std::collections::HashSet::new();

    for part in parts {
        let (start, end) = parse_token(part, single_token_mode)?;
        if single_token_mode && start == 1 && end == 0 {
            // A lone zero/negative number keeps everything.
            return Ok(segments.to_vec());
        }
        if start == 0 || end == 0 {
            return Err(RangeError::NonPositive);
        }

        let lo = start.min(end);
        let hi = start.max(end);
        if lo > total {
            continue;
        }

        for number in lo..=hi {
            if number > total {
                break;
            }
            if selected_indexes.insert(number) {
                selected.push(segments[number - 1].clone());
            }
        }
    }

    Ok(selected)
}

/// Parse one comma-separated token into an inclusive (start, end)
/// pair. In single-token mode a bare number N means 1..=N; a
/// non-positive lone number returns (1, 0) as a keep-all marker.
fn parse_token(part: &str, single_token_mode: bool) -> Result<(usize, usize), RangeError> {
    if let Ok(value) = part.parse::<i64>() {
        if single_token_mode {
            if value <= 0 {
                return Ok((1, 0));
            }
            return Ok((1, value as usize));
        }
        if value <= 0 {
            return Err(RangeError::NonPositive);
        }
        return Ok((value as usize, value as usize));
    }

    let Some((start_raw, end_raw)) = part.split_once('-') else {
        return Err(RangeError::InvalidToken(part.to_string()));
    };
    let start: i64 = start_raw
        .trim()
        .parse()
        .map_err(|_| RangeError::InvalidToken(part.to_string()))?;
    let end: i64 = end_raw
        .trim()
        .parse()
        .map_err(|_| RangeError::InvalidToken(part.to_string()))?;
    if start <= 0 || end <= 0 {
        return Err(RangeError::NonPositive);
    }
    Ok((start as usize, end as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("s{i}")).collect()
    }

    #[test]
    fn test_empty_spec_keeps_all() {
        let all = segments(3);
        assert_eq!(select_segments_by_range(&all, None).unwrap(), all);
        assert_eq!(select_segments_by_range(&all, Some("  ")).unwrap(), all);
    }

    #[test]
    fn test_lone_number_means_first_n() {
        let all = segments(10);
        let picked = select_segments_by_range(&all, Some("3")).unwrap();
        assert_eq!(picked, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_mixed_spec_with_clipping() {
        let all = segments(10);
        let picked = select_segments_by_range(&all, Some("2,4-6,9-20")).unwrap();
        assert_eq!(picked, vec!["s2", "s4", "s5", "s6", "s9", "s10"]);
    }

    #[test]
    fn test_chinese_punctuation_tolerated() {
        let all = segments(6);
        let picked = select_segments_by_range(&all, Some("1，3到5")).unwrap();
        assert_eq!(picked, vec!["s1", "s3", "s4", "s5"]);
    }

    #[test]
    fn test_reversed_range_accepted() {
        let all = segments(6);
        let picked = select_segments_by_range(&all, Some("5-3,1-1")).unwrap();
        assert_eq!(picked, vec!["s3", "s4", "s5", "s1"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let all = segments(5);
        let picked = select_segments_by_range(&all, Some("2,2,1-3")).unwrap();
        assert_eq!(picked, vec!["s2", "s1", "s3"]);
    }

    #[test]
    fn test_invalid_token_errors() {
        let all = segments(5);
        let err = select_segments_by_range(&all, Some("2,abc")).unwrap_err();
        assert_eq!(err, RangeError::InvalidToken("abc".to_string()));
    }

    #[test]
    fn test_non_positive_in_multi_token_errors() {
        let all = segments(5);
        let err = select_segments_by_range(&all, Some("0,2")).unwrap_err();
        assert_eq!(err, RangeError::NonPositive);
    }

    #[test]
    fn test_lone_non_positive_keeps_all() {
        let all = segments(5);
        assert_eq!(select_segments_by_range(&all, Some("-1")).unwrap(), all);
    }
}
