//! Word-level diff of message edits

use serde::{Deserialize, Serialize};

/// How a run of words relates the old text to the new one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordOp {
    /// Present in both
    Same,
    /// Only in the old text
    Removed,
    /// Only in the new text
    Added,
}

/// Consecutive words sharing one [`WordOp`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordRun {
    /// Relation of the run
    pub op: WordOp,
    /// Words of the run, in order
    pub words: Vec<String>,
}

/// Largest LCS table built for the changed middle of an edit
pub const MAX_LCS_CELLS: usize = 250_000;

/// Diff two texts word by word
///
/// Words are split on whitespace. The shared head and tail are matched
/// directly and the changed middle by a longest common subsequence. Inside
/// a changed region removals come before additions. When the middle would
/// need more than [`MAX_LCS_CELLS`] table cells it is reported as one
/// removal followed by one addition.
pub fn word_diff(before: &str, after: &str) -> Vec<WordRun> {
    let old: Vec<&str> = before.split_whitespace().collect();
    let new: Vec<&str> = after.split_whitespace().collect();

    let head = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let tail = old[head..]
        .iter()
        .rev()
        .zip(new[head..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[head..old.len() - tail];
    let new_mid = &new[head..new.len() - tail];

    let mut runs: Vec<WordRun> = Vec::new();
    let mut push = |op: WordOp, word: &str| match runs.last_mut() {
        Some(run) if run.op == op => run.words.push(word.to_string()),
        _ => runs.push(WordRun {
            op,
            words: vec![word.to_string()],
        }),
    };

    for word in &old[..head] {
        push(WordOp::Same, *word);
    }
    if old_mid.len().saturating_mul(new_mid.len()) > MAX_LCS_CELLS {
        for word in old_mid {
            push(WordOp::Removed, *word);
        }
        for word in new_mid {
            push(WordOp::Added, *word);
        }
    } else {
        diff_middle(old_mid, new_mid, &mut push);
    }
    for word in &old[old.len() - tail..] {
        push(WordOp::Same, *word);
    }

    runs
}

fn diff_middle(old: &[&str], new: &[&str], push: &mut impl FnMut(WordOp, &str)) {
    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            push(WordOp::Same, old[i]);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            push(WordOp::Removed, old[i]);
            i += 1;
        } else {
            push(WordOp::Added, new[j]);
            j += 1;
        }
    }
    for word in &old[i..] {
        push(WordOp::Removed, *word);
    }
    for word in &new[j..] {
        push(WordOp::Added, *word);
    }
}

/// Render a word diff as a `(before, after)` pair of lines
///
/// Removed words are struck through in the first line, added words are
/// bold in the second. Unchanged runs longer than two words collapse to
/// their first and last word around an ellipsis; the edge words at the very
/// start and end of the message are dropped.
pub fn render_word_diff(runs: &[WordRun]) -> (String, String) {
    let mut before = Vec::new();
    let mut after = Vec::new();
    let last = runs.len().saturating_sub(1);

    for (index, run) in runs.iter().enumerate() {
        let joined = run.words.join(" ");
        match run.op {
            WordOp::Removed => before.push(format!("~~{}~~", joined)),
            WordOp::Added => after.push(format!("**{}**", joined)),
            WordOp::Same => {
                let text = if run.words.len() > 2 {
                    let head = if index > 0 { run.words[0].as_str() } else { "" };
                    let tail = if index < last {
                        run.words[run.words.len() - 1].as_str()
                    } else {
                        ""
                    };
                    format!("{} ... {}", head, tail).trim().to_string()
                } else {
                    joined
                };
                before.push(text.clone());
                after.push(text);
            }
        }
    }

    (before.join(" "), after.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(op: WordOp, words: &[&str]) -> WordRun {
        WordRun {
            op,
            words: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[test]
    fn test_single_word_replacement() {
        let runs = word_diff("the quick fox", "the slow fox");
        assert_eq!(
            runs,
            vec![
                run(WordOp::Same, &["the"]),
                run(WordOp::Removed, &["quick"]),
                run(WordOp::Added, &["slow"]),
                run(WordOp::Same, &["fox"]),
            ]
        );
    }

    #[test]
    fn test_identical_text_is_one_run() {
        let runs = word_diff("a  b\nc", "a b c");
        assert_eq!(runs, vec![run(WordOp::Same, &["a", "b", "c"])]);
    }

    #[test]
    fn test_empty_sides() {
        assert!(word_diff("", "").is_empty());
        assert_eq!(word_diff("", "hi there"), vec![run(WordOp::Added, &["hi", "there"])]);
    }

    #[test]
    fn test_render_collapses_long_unchanged_runs() {
        let runs = word_diff(
            "one two three four five old six seven eight",
            "one two three four five new six seven eight",
        );
        let (before, after) = render_word_diff(&runs);
        assert_eq!(before, "... five ~~old~~ six ...");
        assert_eq!(after, "... five **new** six ...");
    }

    #[test]
    fn test_oversized_edit_falls_back_to_whole_text() {
        let old: Vec<String> = (0..600).map(|i| format!("a{}", i)).collect();
        let new: Vec<String> = (0..600).map(|i| format!("b{}", i)).collect();
        let before = format!("keep {} end", old.join(" "));
        let after = format!("keep {} end", new.join(" "));

        let runs = word_diff(&before, &after);
        assert_eq!(runs.len(), 4);
        assert_eq!(runs[0], run(WordOp::Same, &["keep"]));
        assert_eq!(runs[1].op, WordOp::Removed);
        assert_eq!(runs[1].words, old);
        assert_eq!(runs[2].op, WordOp::Added);
        assert_eq!(runs[2].words, new);
        assert_eq!(runs[3], run(WordOp::Same, &["end"]));
    }

    #[test]
    fn test_long_message_with_small_edit_stays_precise() {
        let words: Vec<String> = (0..5000).map(|i| format!("w{}", i)).collect();
        let before = words.join(" ");
        let after = before.replacen("w2500", "changed", 1);

        let runs = word_diff(&before, &after);
        assert_eq!(runs.len(), 4);
        assert_eq!(runs[1], run(WordOp::Removed, &["w2500"]));
        assert_eq!(runs[2], run(WordOp::Added, &["changed"]));
    }
}
