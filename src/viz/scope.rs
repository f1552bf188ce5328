//! Oscilloscope widget for ratatui

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    widgets::{Block, Widget},
};

/// Peak-per-column view of recent output samples
pub struct Scope<'a> {
    samples: &'a [f32],
    style: Style,
    block: Option<Block<'a>>,
}

impl<'a> Scope<'a> {
    pub fn new(samples: &'a [f32]) -> Self {
        Self {
            samples,
            style: Style::default(),
            block: None,
        }
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    fn render_scope(&self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let height = area.height as f32;
        let center = area.y + area.height / 2;
        for x in area.x..area.x + area.width {
            buf.set_string(x, center, "─", Style::default());
        }

        let width = area.width as usize;
        for (col, (lo, hi)) in column_ranges(self.samples, width).into_iter().enumerate() {
            let top = row_for(hi, area.y, height);
            let bottom = row_for(lo, area.y, height);
            for y in top..=bottom {
                buf.set_string(area.x + col as u16, y, "│", self.style);
            }
        }
    }
}

/// Min and max of the samples falling in each of `width` columns
fn column_ranges(samples: &[f32], width: usize) -> Vec<(f32, f32)> {
    if samples.is_empty() || width == 0 {
        return Vec::new();
    }
    let per_col = samples.len() as f32 / width as f32;
    (0..width)
        .filter_map(|x| {
            let start = ((x as f32 * per_col) as usize).min(samples.len() - 1);
            let end = (((x + 1) as f32 * per_col) as usize).clamp(start + 1, samples.len());
            let chunk = samples.get(start..end)?;
            let lo = chunk.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            Some((lo.clamp(-1.0, 1.0), hi.clamp(-1.0, 1.0)))
        })
        .collect()
}

/// Screen row for an amplitude in [-1, 1]; +1 is the top row
fn row_for(value: f32, top: u16, height: f32) -> u16 {
    let row = ((1.0 - value) * 0.5 * (height - 1.0)).round();
    top + row.clamp(0.0, height - 1.0) as u16
}

impl Widget for Scope<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = match &self.block {
            Some(block) => {
                let inner = block.inner(area);
                block.clone().render(area, buf);
                inner
            }
            None => area,
        };

        self.render_scope(inner_area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::style::Color;

    #[test]
    fn test_scope_empty_draws_center_line() {
        let area = Rect::new(0, 0, 10, 5);
        let mut buf = Buffer::empty(area);
        Scope::new(&[]).render(area, &mut buf);
        assert_eq!(buf[(0, 2)].symbol(), "─");
        assert_eq!(buf[(0, 0)].symbol(), " ");
    }

    #[test]
    fn test_full_scale_spans_height() {
        let samples = [1.0, -1.0];
        let area = Rect::new(0, 0, 1, 5);
        let mut buf = Buffer::empty(area);
        Scope::new(&samples).render(area, &mut buf);
        for y in 0..5 {
            assert_eq!(buf[(0, y)].symbol(), "│");
        }
    }

    #[test]
    fn test_column_ranges() {
        let samples = [0.0, 0.5, -0.25, 0.75];
        let ranges = column_ranges(&samples, 2);
        assert_eq!(ranges, vec![(0.0, 0.5), (-0.25, 0.75)]);
        // More columns than samples still yields one range per column
        assert_eq!(column_ranges(&samples, 8).len(), 8);
    }

    #[test]
    fn test_row_mapping() {
        assert_eq!(row_for(1.0, 0, 5.0), 0);
        assert_eq!(row_for(0.0, 0, 5.0), 2);
        assert_eq!(row_for(-1.0, 3, 5.0), 7);
    }

    #[test]
    fn test_scope_with_block_and_style() {
        let samples = vec![0.5; 10];
        let scope = Scope::new(&samples)
            .style(Style::default().fg(Color::Red))
            .block(Block::default().title("Test"));
        assert_eq!(scope.style.fg, Some(Color::Red));
        let area = Rect::new(0, 0, 20, 10);
        let mut buf = Buffer::empty(area);
        scope.render(area, &mut buf);
    }
}
