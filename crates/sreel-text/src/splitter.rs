//! Sentence splitting and grouping.
//!
//! One char-by-char walker backs both the segmentation splitter and
//! the caption-unit splitter; the two differ only in their delimiter
//! set. Non-split rules:
//!
//! - the next char is another delimiter (delimiter runs stay together)
//! - the next char is an opening quote/bracket
//! - the delimiter is `.` flanked by digits (`3.14`)
//! - the delimiter is `?` preceded by `?` (damaged encoding runs)
//!
//! Closing quotes/brackets after a delimiter attach to the just-closed
//! sentence.

/// Delimiters for segmentation sentences and captions.
const SENTENCE_DELIMITERS: &[char] = &[
    '.', '!', '?', ';', '。', '！', '？', '；', ',', '，',
];

/// Captions additionally break at the CJK enumeration comma.
const CAPTION_DELIMITERS: &[char] = &[
    '.', '!', '?', ';', '。', '！', '？', '；', ',', '，', '、',
];

const OPENING_MARKS: &[char] = &[
    '"', '“', '‘', '「', '『', '（', '(', '[', '【', '《', '〈',
];

const CLOSING_MARKS: &[char] = &[
    '"', '”', '’', '」', '』', '）', ')', ']', '】', '》', '〉',
];

/// Normalize raw prose for splitting: drop heading-like marker lines
/// (`# 3 (5 sentences)` and variants), then collapse whitespace runs
/// to single spaces.
pub fn normalize_for_split(text: &str) -> String {
    let mut kept_lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if is_heading_marker(line) {
            continue;
        }
        kept_lines.push(line);
    }
    let joined = kept_lines.join(" ");
    let mut normalized = String::with_capacity(joined.len());
    let mut in_whitespace = false;
    for c in joined.chars() {
        if c.is_whitespace() {
            if !in_whitespace && !normalized.is_empty() {
                normalized.push(' ');
            }
            in_whitespace = true;
        } else {
            normalized.push(c);
            in_whitespace = false;
        }
    }
    normalized.trim_end().to_string()
}

/// Heading markers look like `# 3`, `# 3 (5 sentences)`, `# 3（5句）`.
fn is_heading_marker(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('#') else {
        return false;
    };
    let rest = rest.trim_start_matches('#').trim();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return false;
    }
    let tail = rest[digits.len()..].trim();
    if tail.is_empty() {
        return true;
    }
    // Only a parenthesized annotation may follow the number.
    (tail.starts_with('(') && tail.ends_with(')'))
        || (tail.starts_with('（') && tail.ends_with('）'))
}

fn split_with_delimiters(text: &str, delimiters: &[char]) -> Vec<String> {
    let normalized = normalize_for_split(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = normalized.chars().collect();
    let mut units: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut index = 0usize;

    while index < chars.len() {
        let c = chars[index];
        let is_delimiter = delimiters.contains(&c);
        if is_delimiter {
            // `xxx ,` reads as `xxx,` once split.
            while current.ends_with(' ') {
                current.pop();
            }
        }
        current.push(c);

        if !is_delimiter {
            index += 1;
            continue;
        }

        let prev = if index > 0 { Some(chars[index - 1]) } else { None };
        let next = chars.get(index + 1).copied();

        let next_is_delimiter = next.map(|n| delimiters.contains(&n)).unwrap_or(false);
        let next_is_opening = next.map(|n| OPENING_MARKS.contains(&n)).unwrap_or(false);
        let decimal_point = c == '.'
            && prev.map(|p| p.is_ascii_digit()).unwrap_or(false)
            && next.map(|n| n.is_ascii_digit()).unwrap_or(false);
        let damaged_question = c == '?' && prev == Some('?');

        if next_is_delimiter || next_is_opening || decimal_point || damaged_question {
            index += 1;
            continue;
        }

        // Closing quotes/brackets stay with the sentence they close.
        let mut lookahead = index + 1;
        while let Some(&mark) = chars.get(lookahead) {
            if CLOSING_MARKS.contains(&mark) {
                current.push(mark);
                lookahead += 1;
            } else {
                break;
            }
        }
        index = lookahead;

        let unit = current.trim().to_string();
        if !unit.is_empty() {
            units.push(unit);
        }
        current.clear();
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        units.push(tail);
    }

    if units.is_empty() {
        vec![normalized]
    } else {
        units
    }
}

/// Split prose into sentences for segmentation.
pub fn split_sentences(text: &str) -> Vec<String> {
    split_with_delimiters(text, SENTENCE_DELIMITERS)
}

/// Split a segment's text into caption presentation units.
pub fn split_caption_units(text: &str) -> Vec<String> {
    split_with_delimiters(text, CAPTION_DELIMITERS)
}

/// Number of sentences the segmentation splitter produces.
pub fn count_sentences(text: &str) -> usize {
    split_sentences(text).len()
}

/// Combine sentences in runs of `per_segment`.
pub fn group_sentences(sentences: &[String], per_segment: usize) -> Vec<String> {
    let size = per_segment.max(1);
    sentences
        .chunks(size)
        .map(|chunk| chunk.concat())
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Slice the normalized text every `chunk_size` code points.
pub fn segment_by_fixed(text: &str, chunk_size: usize) -> Vec<String> {
    let normalized = normalize_for_split(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    let size = chunk_size.max(1);
    let chars: Vec<char> = normalized.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cjk_split() {
        let units = split_sentences("今天好热,明天更热。3.14 来了????");
        assert_eq!(units, vec!["今天好热,", "明天更热。", "3.14 来了????"]);
    }

    #[test]
    fn test_decimal_point_does_not_split() {
        let units = split_sentences("圆周率是3.14。后面还有话。");
        assert_eq!(units, vec!["圆周率是3.14。", "后面还有话。"]);
    }

    #[test]
    fn test_question_run_stays_together() {
        let units = split_sentences("你说什么????我不信!");
        assert_eq!(units, vec!["你说什么????", "我不信!"]);
    }

    #[test]
    fn test_closing_quote_attaches() {
        let units = split_sentences("他说：“走吧。”然后离开了。");
        assert_eq!(units, vec!["他说：“走吧。”", "然后离开了。"]);
    }

    #[test]
    fn test_delimiter_before_opening_quote_does_not_split() {
        let units = split_sentences("她点头。“好。”");
        assert_eq!(units, vec!["她点头。“好。”"]);
    }

    #[test]
    fn test_ascii_comma_splits_with_spaces() {
        let units = split_sentences(" xxx ,yyy ");
        assert_eq!(units, vec!["xxx,", "yyy"]);
    }

    #[test]
    fn test_heading_markers_are_stripped() {
        let units = split_sentences("# 1 (3 sentences)\n她来了。他走了。");
        assert_eq!(units, vec!["她来了。", "他走了。"]);
    }

    #[test]
    fn test_split_is_deterministic() {
        let text = "第一句。第二句！第三句？";
        assert_eq!(split_sentences(text), split_sentences(text));
    }

    #[test]
    fn test_caption_units_break_at_enumeration_comma() {
        let units = split_caption_units("刀、枪、剑。都在墙上。");
        assert_eq!(units, vec!["刀、", "枪、", "剑。", "都在墙上。"]);
    }

    #[test]
    fn test_group_sentences() {
        let sentences: Vec<String> =
            vec!["A。".into(), "B。".into(), "C。".into(), "D。".into(), "E。".into()];
        let groups = group_sentences(&sentences, 2);
        assert_eq!(groups, vec!["A。B。", "C。D。", "E。"]);
    }

    #[test]
    fn test_fixed_slices_by_code_points() {
        let segments = segment_by_fixed("一二三四五六七", 3);
        assert_eq!(segments, vec!["一二三", "四五六", "七"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(split_sentences("   ").is_empty());
        assert!(segment_by_fixed("", 10).is_empty());
    }
}
