use std::collections::VecDeque;
use std::str::Chars;
use std::time::Duration;

use super::{random_in_range, random_millis};

pub const MISTAKE_RATE: f64 = 0.05;
pub const WORD_PAUSE_CHANCE: f64 = 0.15;

/// How a typing step is delivered to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingAction {
    /// Insert the step's text as typed characters.
    Type,
    /// Press the named key (e.g. `Backspace`).
    Press,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingStep {
    pub key: String,
    pub delay: Duration,
    pub action: TypingAction,
}

/// Keystroke plan for a piece of text. Iterating it again draws a fresh set
/// of mistakes and delays.
#[derive(Debug, Clone)]
pub struct TypingSequence {
    text: String,
}

pub fn typing_sequence(text: &str) -> TypingSequence {
    TypingSequence {
        text: text.to_string(),
    }
}

impl TypingSequence {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn iter(&self) -> TypingSteps<'_> {
        TypingSteps {
            chars: self.text.chars(),
            pending: VecDeque::with_capacity(3),
        }
    }
}

impl<'a> IntoIterator for &'a TypingSequence {
    type Item = TypingStep;
    type IntoIter = TypingSteps<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct TypingSteps<'a> {
    chars: Chars<'a>,
    pending: VecDeque<TypingStep>,
}

impl Iterator for TypingSteps<'_> {
    type Item = TypingStep;

    fn next(&mut self) -> Option<TypingStep> {
        if let Some(step) = self.pending.pop_front() {
            return Some(step);
        }

        let ch = self.chars.next()?;

        if ch.is_ascii_alphabetic() && rand::random::<f64>() < MISTAKE_RATE {
            self.pending.push_back(TypingStep {
                key: nearby_key(ch).to_string(),
                delay: random_millis(80.0, 200.0),
                action: TypingAction::Type,
            });
            self.pending.push_back(TypingStep {
                key: "Backspace".to_string(),
                delay: random_millis(100.0, 200.0),
                action: TypingAction::Press,
            });
        }

        let delay = if ch == ' ' && rand::random::<f64>() < WORD_PAUSE_CHANCE {
            random_millis(300.0, 800.0)
        } else {
            random_millis(100.0, 180.0)
        };
        self.pending.push_back(TypingStep {
            key: ch.to_string(),
            delay,
            action: TypingAction::Type,
        });

        self.pending.pop_front()
    }
}

/// Delay used between held and chorded key events.
pub fn keypress_delay() -> Duration {
    random_millis(80.0, 120.0)
}

/// A neighbouring key on a QWERTY layout, keeping the original case.
fn nearby_key(ch: char) -> char {
    let neighbours = match ch.to_ascii_lowercase() {
        'a' => "qwsz",
        'b' => "vghn",
        'c' => "xdfv",
        'd' => "ersfcx",
        'e' => "wsdr",
        'f' => "rtgdcv",
        'g' => "tyhfvb",
        'h' => "yujgbn",
        'i' => "ujko",
        'j' => "uikhnm",
        'k' => "ijolm",
        'l' => "kop",
        'm' => "njk",
        'n' => "bhjm",
        'o' => "iklp",
        'p' => "ol",
        'q' => "wa",
        'r' => "edft",
        's' => "awedxz",
        't' => "rfgy",
        'u' => "yhji",
        'v' => "cfgb",
        'w' => "qase",
        'x' => "zsdc",
        'y' => "tghu",
        'z' => "asx",
        _ => return ch,
    };
    let bytes = neighbours.as_bytes();
    let pick = (random_in_range(0.0, bytes.len() as f64) as usize).min(bytes.len() - 1);
    let wrong = bytes[pick] as char;
    if ch.is_ascii_uppercase() {
        wrong.to_ascii_uppercase()
    } else {
        wrong
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a sequence the way a text field would receive it.
    fn replay(steps: impl Iterator<Item = TypingStep>) -> String {
        let mut out = String::new();
        for step in steps {
            match step.action {
                TypingAction::Type => out.push_str(&step.key),
                TypingAction::Press => {
                    assert_eq!(step.key, "Backspace");
                    out.pop();
                }
            }
        }
        out
    }

    #[test]
    fn typed_text_always_reconstructs() {
        let seq = typing_sequence("cat");
        for _ in 0..1000 {
            assert_eq!(replay(seq.iter()), "cat");
        }
    }

    #[test]
    fn mistake_rate_is_roughly_five_percent() {
        let seq = typing_sequence("cat");
        let mut letters = 0usize;
        let mut mistakes = 0usize;
        for _ in 0..1000 {
            letters += 3;
            mistakes += seq
                .iter()
                .filter(|s| s.action == TypingAction::Press)
                .count();
        }
        let rate = mistakes as f64 / letters as f64;
        assert!((0.02..0.09).contains(&rate), "mistake rate {rate}");
    }

    #[test]
    fn non_letters_never_get_mistakes() {
        let seq = typing_sequence("1234 !?");
        for _ in 0..200 {
            assert!(seq.iter().all(|s| s.action == TypingAction::Type));
            assert_eq!(seq.iter().count(), 7);
        }
    }

    #[test]
    fn delays_stay_within_bounds() {
        let seq = typing_sequence("hello world, typing at human speed");
        for step in seq.iter() {
            let ms = step.delay.as_millis();
            assert!((80..800).contains(&ms), "delay {ms}ms out of range");
        }
    }

    #[test]
    fn nearby_key_preserves_case() {
        for _ in 0..100 {
            assert!(nearby_key('Q').is_ascii_uppercase());
            assert!("wa".contains(nearby_key('q')));
        }
    }

    #[test]
    fn keypress_delay_range() {
        for _ in 0..100 {
            let ms = keypress_delay().as_millis();
            assert!((80..120).contains(&ms));
        }
    }
}
