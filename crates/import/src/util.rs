/// Case-insensitive gestalt similarity: `2 * M / T`, where `M` counts the
/// characters in recursively found longest common blocks and `T` is the
/// combined length. Returns a value in [0.0, 1.0]; two empty strings are 1.0.
pub fn similarity_ratio(s1: &str, s2: &str) -> f64 {
    let a: Vec<char> = s1.to_lowercase().chars().collect();
    let b: Vec<char> = s2.to_lowercase().chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_block(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`, returned as
/// `(start_in_a, start_in_b, len)`. Earliest block in `a`, then in `b`, wins ties.
fn longest_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width + 1];
    let mut curr = vec![0usize; width + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            curr[col] = if a[i] == b[j] { prev[col - 1] + 1 } else { 0 };
            if curr[col] > best.2 {
                let k = curr[col];
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_one() {
        assert_eq!(similarity_ratio("ACME", "ACME"), 1.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
    }

    #[test]
    fn one_empty_string_is_zero() {
        assert_eq!(similarity_ratio("", "abc"), 0.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(similarity_ratio("Acme Trading", "ACME TRADING"), 1.0);
    }

    #[test]
    fn dropped_trailing_letter() {
        // 18 matching chars over 19 + 18.
        let score = similarity_ratio("SK CURTAIN & BLINDS", "SK CURTAIN & BLIND");
        assert!((score - 36.0 / 37.0).abs() < 1e-9, "score was {score}");
        assert!(score >= 0.95);
    }

    #[test]
    fn recursive_blocks_are_counted() {
        // "abcd" vs "bcda": block "bcd" (3) then nothing on either side that pairs.
        assert!((similarity_ratio("abcd", "bcda") - 0.75).abs() < 1e-9);
        // "abxcd" vs "abcd": "ab" then "cd" on the right.
        assert!((similarity_ratio("abxcd", "abcd") - 8.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn commutative_for_simple_cases() {
        assert_eq!(
            similarity_ratio("amazon", "amzn"),
            similarity_ratio("amzn", "amazon")
        );
    }

    #[test]
    fn unrelated_names_score_low() {
        let score = similarity_ratio("UNKNOWN COMPANY", "ZEBRA LOGISTICS");
        assert!(score < 0.5, "score was {score}");
    }
}
