/// Upper bound on normalization/comparison steps before `find_quote_offsets`
/// gives up, guarding against pathological (e.g. all-whitespace) inputs.
const MAX_STEPS: usize = 2_000_000;

/// Options controlling the tolerance of `find_quote_offsets`.
#[derive(Clone, Copy, Debug)]
pub struct QuoteMatchOptions {
    pub case_insensitive: bool,
    pub collapse_whitespace: bool,
    pub normalize_quotes: bool,
    pub normalize_dashes: bool,
}

impl Default for QuoteMatchOptions {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            collapse_whitespace: true,
            normalize_quotes: true,
            normalize_dashes: true,
        }
    }
}

/// Character offset span, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

/// Finds `needle` within `hay`, tolerant of case, whitespace differences,
/// curly vs. straight quotes, and en/em-dash vs. hyphen differences, per
/// `opts`. When `collapse_whitespace` is set, whitespace is dropped
/// entirely rather than collapsed to a single space, so a run of
/// whitespace on one side matches zero, one, or many whitespace
/// characters on the other (spec §8 scenario 4: a quote missing the
/// space before a unit must still bind against source text that has
/// one). Returns character offsets into `hay` (not byte offsets) such
/// that `char_slice(hay, start, end)` equals `needle` after the same
/// normalization is applied to both sides, modulo whitespace.
///
/// Returns `None` if no match is found or if the bounded step budget is
/// exhausted before a match can be confirmed.
pub fn find_quote_offsets(hay: &str, needle: &str, opts: QuoteMatchOptions) -> Option<CharSpan> {
    if needle.is_empty() {
        return None;
    }

    let hay_chars: Vec<char> = hay.chars().collect();
    let needle_norm: Vec<char> = normalize_chars(needle.chars(), opts);
    if needle_norm.is_empty() {
        return None;
    }

    let mut steps: usize = 0;
    let n = hay_chars.len();

    // Precompute the normalized form (with source index mapping) once.
    // Whitespace is dropped rather than collapsed so a lone space on one
    // side lines up with no space on the other.
    let mut norm_hay: Vec<char> = Vec::with_capacity(n);
    let mut index_map: Vec<usize> = Vec::with_capacity(n);
    for (i, &c) in hay_chars.iter().enumerate() {
        steps += 1;
        if steps > MAX_STEPS {
            return None;
        }
        if opts.collapse_whitespace && c.is_whitespace() {
            continue;
        }
        norm_hay.push(normalize_one(c, opts));
        index_map.push(i);
    }

    let m = needle_norm.len();
    if m == 0 || m > norm_hay.len() {
        return None;
    }

    for start in 0..=(norm_hay.len() - m) {
        steps += m;
        if steps > MAX_STEPS {
            return None;
        }
        if norm_hay[start..start + m] == needle_norm[..] {
            let char_start = index_map[start];
            let char_end = if start + m < index_map.len() {
                index_map[start + m]
            } else {
                n
            };
            return Some(CharSpan {
                start: char_start,
                end: char_end,
            });
        }
    }

    None
}

fn normalize_chars(chars: impl Iterator<Item = char>, opts: QuoteMatchOptions) -> Vec<char> {
    let mut out = Vec::new();
    for c in chars {
        if opts.collapse_whitespace && c.is_whitespace() {
            continue;
        }
        out.push(normalize_one(c, opts));
    }
    out
}

fn normalize_one(c: char, opts: QuoteMatchOptions) -> char {
    let c = if opts.case_insensitive {
        c.to_ascii_lowercase()
    } else {
        c
    };
    let c = if opts.normalize_quotes {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' => '"',
            other => other,
        }
    } else {
        c
    };
    if opts.normalize_dashes {
        match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            other => other,
        }
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::char_slice;

    #[test]
    fn finds_exact_match() {
        let hay = "Marie Curie discovered radium in 1898.";
        let span = find_quote_offsets(hay, "Curie", QuoteMatchOptions::default()).unwrap();
        assert_eq!(char_slice(hay, span.start, span.end), "Curie");
    }

    #[test]
    fn tolerates_case_and_whitespace_differences() {
        let hay = "The sample was heated to  770   \u{00B0}C before failure.";
        let span = find_quote_offsets(hay, "770 °C", QuoteMatchOptions::default()).unwrap();
        let found = char_slice(hay, span.start, span.end);
        assert_eq!(found.split_whitespace().collect::<String>(), "770°C");
    }

    #[test]
    fn tolerates_curly_quotes_and_dashes() {
        let hay = "She said \u{201C}it works\u{201D} \u{2014} finally.";
        let span = find_quote_offsets(hay, "\"it works\" - finally", QuoteMatchOptions::default())
            .unwrap();
        assert!(span.end > span.start);
    }

    #[test]
    fn returns_none_when_absent() {
        let hay = "hello world";
        assert!(find_quote_offsets(hay, "goodbye", QuoteMatchOptions::default()).is_none());
    }

    #[test]
    fn returns_none_for_empty_needle() {
        let hay = "hello world";
        assert!(find_quote_offsets(hay, "", QuoteMatchOptions::default()).is_none());
    }

    #[test]
    fn matches_when_needle_drops_a_space_the_hay_has() {
        // Spec §8 scenario 4: the hay has a space before the unit, the
        // quote doesn't. Whitespace tolerance must work in this direction
        // too, not just when the hay has the extra whitespace.
        let hay = "The Curie temperature of iron is 770 °C at standard pressure.";
        let needle = "Curie temperature of iron is 770°C";
        let span = find_quote_offsets(hay, needle, QuoteMatchOptions::default()).unwrap();
        let found = char_slice(hay, span.start, span.end);
        assert_eq!(
            found.split_whitespace().collect::<String>(),
            "Curietemperatureofironis770°C"
        );
        assert!(found.starts_with("Curie"));
    }
}
