// Orthographic phonetic analysis for English verse.
//
// There is no pronouncing dictionary here: syllables, stress and rhyme parts
// are derived from spelling with a handful of rules that are good enough for
// scoring meter and matching rhymes.
//
// - Vowel groups are maximal runs of a/e/i/o/u, with `y` counted as a vowel
//   unless it starts the word or follows another vowel ("sky", "happy" vs
//   "yes", "day").
// - One trailing group is silenced when it is a final `e` ("love", "fire";
//   but not consonant + `le` as in "table"), an `-ed` not after t/d
//   ("loved" vs "wanted"), or an `-es` not after a sibilant ("loves" vs
//   "roses").
// - Monosyllabic function words are unstressed, other monosyllables are
//   stressed, polysyllables start stressed and alternate.
// - The rhyme part runs from the last sounded vowel group to the end of the
//   word, so the silent `e` stays attached ("love" -> "ove").
//
// The function-word test comes from the `Lexicon`, which keeps this module
// free of hard-coded word lists.

use crate::Lexicon;
use crate::types::PhoneticAnalysis;

/// Analyze one word. Pure: the same word and lexicon always give the same
/// record.
pub fn analyze(lexicon: &Lexicon, word: &str) -> PhoneticAnalysis {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if letters.is_empty() {
        return PhoneticAnalysis {
            phonemes: Vec::new(),
            syllable_count: 0,
            stress_pattern: Vec::new(),
            rhyme_part: String::new(),
        };
    }

    let groups = vowel_groups(&letters);
    let sounded = sounded_groups(&letters, &groups);
    let syllable_count = sounded.len().max(1);
    let normalized: String = letters.iter().collect();
    let function = lexicon.is_function_word(&normalized);

    let rhyme_part = match sounded.last() {
        Some(&(start, _)) => letters[start..].iter().collect(),
        None => normalized.clone(),
    };

    PhoneticAnalysis {
        phonemes: clusters(&letters),
        syllable_count,
        stress_pattern: stress_pattern(syllable_count, function),
        rhyme_part,
    }
}

fn is_plain_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

fn is_vowel_at(letters: &[char], i: usize) -> bool {
    let c = letters[i];
    if is_plain_vowel(c) {
        return true;
    }
    c == 'y' && i > 0 && !is_plain_vowel(letters[i - 1])
}

/// Half-open `(start, end)` ranges of consecutive vowels.
fn vowel_groups(letters: &[char]) -> Vec<(usize, usize)> {
    let mut groups = Vec::new();
    let mut start = None;
    for i in 0..letters.len() {
        match (is_vowel_at(letters, i), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                groups.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        groups.push((s, letters.len()));
    }
    groups
}

/// Drop at most one silent trailing group.
fn sounded_groups(letters: &[char], groups: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut sounded = groups.to_vec();
    if sounded.len() < 2 {
        return sounded;
    }
    let n = letters.len();
    let last = sounded[sounded.len() - 1];

    let silent = if last == (n - 1, n) && letters[n - 1] == 'e' {
        // consonant + "le" keeps its syllable
        !(n >= 3 && letters[n - 2] == 'l' && !is_vowel_at(letters, n - 3))
    } else if n >= 3 && last == (n - 2, n - 1) && letters[n - 2] == 'e' {
        let before = letters[n - 3];
        match letters[n - 1] {
            'd' => !matches!(before, 't' | 'd'),
            's' => !matches!(before, 's' | 'x' | 'z' | 'c' | 'g' | 'h'),
            _ => false,
        }
    } else {
        false
    };

    if silent {
        sounded.pop();
    }
    sounded
}

fn stress_pattern(syllables: usize, function_word: bool) -> Vec<u8> {
    if syllables == 1 {
        return vec![if function_word { 0 } else { 1 }];
    }
    (0..syllables).map(|i| if i % 2 == 0 { 1 } else { 0 }).collect()
}

/// Alternating consonant/vowel clusters.
fn clusters(letters: &[char]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_vowel = None;
    for (i, &c) in letters.iter().enumerate() {
        let vowel = is_vowel_at(letters, i);
        if current_vowel.is_some_and(|v| v != vowel) {
            out.push(std::mem::take(&mut current));
        }
        current.push(c);
        current_vowel = Some(vowel);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_lexicon;

    fn syllables(word: &str) -> usize {
        analyze(&default_lexicon(), word).syllable_count
    }

    #[test]
    fn test_syllable_counts() {
        assert_eq!(syllables("night"), 1);
        assert_eq!(syllables("love"), 1);
        assert_eq!(syllables("loved"), 1);
        assert_eq!(syllables("wanted"), 2);
        assert_eq!(syllables("loves"), 1);
        assert_eq!(syllables("roses"), 2);
        assert_eq!(syllables("table"), 2);
        assert_eq!(syllables("happy"), 2);
        assert_eq!(syllables("sky"), 1);
        assert_eq!(syllables("day"), 1);
        assert_eq!(syllables("beautiful"), 3);
        assert_eq!(syllables("rhythm"), 1);
    }

    #[test]
    fn test_word_without_vowels_is_one_syllable() {
        let a = analyze(&default_lexicon(), "hmm");
        assert_eq!(a.syllable_count, 1);
        assert_eq!(a.rhyme_part, "hmm");
    }

    #[test]
    fn test_empty_word() {
        let a = analyze(&default_lexicon(), "--");
        assert_eq!(a.syllable_count, 0);
        assert!(a.stress_pattern.is_empty());
        assert!(a.rhyme_part.is_empty());
    }

    #[test]
    fn test_function_words_unstressed() {
        let lex = default_lexicon();
        assert_eq!(analyze(&lex, "the").stress_pattern, vec![0]);
        assert_eq!(analyze(&lex, "moon").stress_pattern, vec![1]);
        assert_eq!(analyze(&lex, "silver").stress_pattern, vec![1, 0]);
    }

    #[test]
    fn test_rhyme_parts() {
        let lex = default_lexicon();
        let night = analyze(&lex, "night");
        let light = analyze(&lex, "Light");
        let love = analyze(&lex, "love");
        let dove = analyze(&lex, "dove");
        assert_eq!(night.rhyme_part, "ight");
        assert!(night.rhymes_with(&light));
        assert_eq!(love.rhyme_part, "ove");
        assert!(love.rhymes_with(&dove));
        assert!(!love.rhymes_with(&night));
    }

    #[test]
    fn test_phoneme_clusters() {
        let a = analyze(&default_lexicon(), "night");
        assert_eq!(a.phonemes, vec!["n", "i", "ght"]);
    }

    #[test]
    fn test_stress_pattern_length_matches_syllables() {
        let lex = default_lexicon();
        for w in ["wandering", "across", "evening", "o", "stars"] {
            let a = analyze(&lex, w);
            assert_eq!(a.stress_pattern.len(), a.syllable_count, "{w}");
        }
    }
}
