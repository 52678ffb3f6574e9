//! Incremental lesson output.
//!
//! Lesson views are re-derived from the whole buffer on every update, so the
//! printer only writes the bytes it has not written yet. Until the quiz
//! separator has appeared, the tail of the lesson could still turn out to be
//! the start of the separator; that tail is held back.

use std::io::{self, Write};

use tutor_core::{LessonUpdate, QUIZ_SEPARATOR};

/// Writes a growing lesson to an output without repeating or leaking text.
#[derive(Debug)]
pub struct LessonPrinter<W> {
    out: W,
    printed: usize,
}

impl<W: Write> LessonPrinter<W> {
    /// Creates a printer writing to `out`.
    pub const fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    /// Writes whatever part of the update is safe to show.
    pub fn update(&mut self, update: &LessonUpdate) -> io::Result<()> {
        let end = if update.quiz_raw.is_some() {
            update.lesson.len()
        } else {
            holdback_end(&update.lesson)
        };
        self.write_through(&update.lesson, end)
    }

    /// Writes the rest of the final lesson text and a trailing newline.
    pub fn finish(&mut self, lesson: &str) -> io::Result<()> {
        self.write_through(lesson, lesson.len())?;
        writeln!(self.out)?;
        self.out.flush()
    }

    fn write_through(&mut self, text: &str, end: usize) -> io::Result<()> {
        if end <= self.printed {
            return Ok(());
        }
        if let Some(chunk) = text.get(self.printed..end) {
            self.out.write_all(chunk.as_bytes())?;
            self.out.flush()?;
        }
        self.printed = end;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// End of the prefix that cannot be part of a separator still arriving.
fn holdback_end(lesson: &str) -> usize {
    let mut end = lesson.len().saturating_sub(QUIZ_SEPARATOR.len() - 1);
    while !lesson.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tutor_core::LessonRun;

    fn print_fragments(fragments: &[&str]) -> String {
        let mut run = LessonRun::new();
        let mut printer = LessonPrinter::new(Vec::new());
        for fragment in fragments {
            let update = run.push(fragment).unwrap();
            printer.update(&update).unwrap();
        }
        let finalized = run.finalize().unwrap();
        printer.finish(&finalized.lesson).unwrap();
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn test_separator_never_printed() {
        let output = print_fragments(&[
            "# Intro\nSome text ",
            "---QUIZ",
            "_START---[]",
        ]);
        assert_eq!(output, "# Intro\nSome text \n");
    }

    #[test]
    fn test_text_without_separator_is_printed_in_full() {
        let output = print_fragments(&["Short", " lesson with a ---tail"]);
        assert_eq!(output, "Short lesson with a ---tail\n");
    }

    #[test]
    fn test_multibyte_text_at_holdback_boundary() {
        let output = print_fragments(&["ownership → borrowing → lifetimes ✓"]);
        assert_eq!(output, "ownership → borrowing → lifetimes ✓\n");
    }

    #[test]
    fn test_holdback_keeps_separator_prefix_back() {
        let mut printer = LessonPrinter::new(Vec::new());
        printer
            .update(&LessonUpdate {
                lesson: "0123456789012345678---QUIZ".to_string(),
                quiz_raw: None,
            })
            .unwrap();
        let written = String::from_utf8(printer.into_inner()).unwrap();
        assert!(!written.contains("---"));
        assert!(written.starts_with("0123"));
    }
}
