//! Indicator rendering

use std::io::{self, Write};

use super::indicator::{Indicator, IndicatorBoard, IndicatorState};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[1;31m";
const BLUE: &str = "\x1b[1;34m";
const WHITE: &str = "\x1b[37m";

/// Draws the board once per frame
pub trait Renderer {
    fn draw(&mut self, board: &IndicatorBoard) -> io::Result<()>;
}

/// Single status line redrawn in place with ANSI colors
///
/// Blink shows red while active, jaw blue, and both are white when neutral.
pub struct TerminalRenderer<W: Write> {
    out: W,
    last: Option<String>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(board: &IndicatorBoard) -> String {
        let cells: Vec<String> = Indicator::ALL
            .iter()
            .map(|&indicator| {
                let color = match (indicator, board.state(indicator)) {
                    (_, IndicatorState::Neutral) => WHITE,
                    (Indicator::Blink, IndicatorState::Active) => RED,
                    (Indicator::Jaw, IndicatorState::Active) => BLUE,
                };
                format!("{color}[{:^7}]{RESET}", indicator.label())
            })
            .collect();
        cells.join(" ")
    }
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn draw(&mut self, board: &IndicatorBoard) -> io::Result<()> {
        let line = Self::line(board);
        // Only touch the terminal when something changed
        if self.last.as_deref() == Some(line.as_str()) {
            return Ok(());
        }

        write!(self.out, "\r{line}")?;
        self.out.flush()?;
        self.last = Some(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;

    fn rendered(renderer: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_neutral_board_is_white() {
        let board = IndicatorBoard::new(Duration::from_secs(1));
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.draw(&board).unwrap();

        let out = rendered(renderer);
        assert!(out.starts_with('\r'));
        assert_eq!(out.matches(WHITE).count(), 2);
        assert!(!out.contains(RED));
        assert!(!out.contains(BLUE));
    }

    #[test]
    fn test_active_colors() {
        let mut board = IndicatorBoard::new(Duration::from_secs(1));
        board.activate(Indicator::Blink, Instant::now());

        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.draw(&board).unwrap();
        let out = rendered(renderer);
        assert!(out.contains(&format!("{RED}[ BLINK ]")));
        assert!(out.contains(&format!("{WHITE}[  JAW  ]")));
    }

    #[test]
    fn test_unchanged_board_is_not_redrawn() {
        let board = IndicatorBoard::new(Duration::from_secs(1));
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.draw(&board).unwrap();
        renderer.draw(&board).unwrap();

        assert_eq!(rendered(renderer).matches('\r').count(), 1);
    }
}
