use std::io::Stdout;
use std::time::Duration;

use bitvec::{BitArr, array::BitArray, slice::BitSlice};
use crossterm::event;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph};

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;

/// Monochrome 64x32 pixel grid. Coordinates wrap around both edges, and
/// pixels only ever change by being flipped or by a full clear.
#[derive(Clone)]
pub struct Framebuffer {
    pixels: BitArr!(for DISPLAY_WIDTH * DISPLAY_HEIGHT),
}

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            pixels: BitArray::ZERO,
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(false);
    }

    fn index(x: usize, y: usize) -> usize {
        (y % DISPLAY_HEIGHT) * DISPLAY_WIDTH + (x % DISPLAY_WIDTH)
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.pixels[Self::index(x, y)]
    }

    /// XORs a lit sprite bit into the pixel at `(x, y)`. Returns `true` if a
    /// lit pixel was erased.
    pub fn flip(&mut self, x: usize, y: usize) -> bool {
        let index = Self::index(x, y);
        let was_lit = self.pixels[index];
        self.pixels.set(index, !was_lit);
        was_lit
    }

    /// Draws an 8-pixel-wide sprite, one byte per row, MSB leftmost.
    /// Returns `true` if any lit pixel was erased.
    pub fn draw_sprite(&mut self, x: usize, y: usize, sprite: &[u8]) -> bool {
        let mut collision = false;

        for (row, &byte) in sprite.iter().enumerate() {
            for bit in 0..8 {
                if (byte >> (7 - bit)) & 1 == 1 && self.flip(x + bit, y + row) {
                    collision = true;
                }
            }
        }
        collision
    }

    pub fn rows(&self) -> impl Iterator<Item = &BitSlice<usize>> {
        self.pixels[..DISPLAY_WIDTH * DISPLAY_HEIGHT].chunks(DISPLAY_WIDTH)
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.not_any()
    }
}

impl PartialEq for Framebuffer {
    fn eq(&self, other: &Self) -> bool {
        self.pixels.as_raw_slice() == other.pixels.as_raw_slice()
    }
}

impl Eq for Framebuffer {}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can present the framebuffer once per frame.
pub trait Renderer {
    fn render(&mut self, framebuffer: &Framebuffer) -> anyhow::Result<()>;
}

/// Draws the framebuffer into the terminal with ratatui. Raw mode is held for
/// the lifetime of the renderer.
pub struct TerminalRenderer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    title: String,
    legend: String,
}

impl TerminalRenderer {
    pub fn new(title: String, legend: String) -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let backend = CrosstermBackend::new(std::io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        Ok(TerminalRenderer {
            terminal,
            title,
            legend,
        })
    }

    fn draw(
        frame: &mut ratatui::Frame,
        area: Rect,
        framebuffer: &Framebuffer,
        title: &str,
        legend: &str,
    ) {
        // 64x32 plus borders
        let game_width = (DISPLAY_WIDTH as u16) + 2;
        let game_height = (DISPLAY_HEIGHT as u16) + 2;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(game_height),
                Constraint::Length(7),
                Constraint::Min(0),
            ])
            .split(area);

        let game_area = if chunks[0].width > game_width {
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Min(0),
                    Constraint::Length(game_width),
                    Constraint::Min(0),
                ])
                .split(chunks[0])[1]
        } else {
            chunks[0]
        };

        let mut screen = String::with_capacity(DISPLAY_WIDTH * DISPLAY_HEIGHT + DISPLAY_HEIGHT);
        for row in framebuffer.rows() {
            screen.extend(row.iter().by_vals().map(|lit| if lit { '█' } else { ' ' }));
            screen.push('\n');
        }
        let game_paragraph = Paragraph::new(screen)
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(Color::White));
        frame.render_widget(game_paragraph, game_area);

        let key_paragraph = Paragraph::new(legend)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Keypad"))
            .style(Style::default().fg(Color::Yellow));
        frame.render_widget(key_paragraph, chunks[1]);
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, framebuffer: &Framebuffer) -> anyhow::Result<()> {
        // Keys are read by the keyboard listener; drop the terminal's copy so
        // nothing echoes.
        while event::poll(Duration::ZERO)? {
            let _ = event::read()?;
        }

        let title = self.title.as_str();
        let legend = self.legend.as_str();
        self.terminal.draw(|frame| {
            let area = frame.area();
            Self::draw(frame, area, framebuffer, title, legend);
        })?;
        Ok(())
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        let _ = self.terminal.clear();
        let _ = self.terminal.show_cursor();
        let _ = disable_raw_mode();
    }
}
