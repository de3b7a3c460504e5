//! Binary morphology over row-major masks with square structuring elements.
//!
//! Square elements are separable, so every operator runs a horizontal pass
//! followed by a vertical pass. Neighbours outside the grid are ignored.

/// Fills small holes and bridges near-adjacent regions (dilate, then erode).
pub(crate) fn close(mask: &[bool], width: usize, height: usize, size: u32) -> Vec<bool> {
    let dilated = sweep(mask, width, height, size, true);
    sweep(&dilated, width, height, size, false)
}

/// Removes isolated specks (erode, then dilate).
pub(crate) fn open(mask: &[bool], width: usize, height: usize, size: u32) -> Vec<bool> {
    let eroded = sweep(mask, width, height, size, false);
    sweep(&eroded, width, height, size, true)
}

/// A cell becomes `dominant` when any in-bounds neighbour within the square
/// holds `dominant`. `true` dilates, `false` erodes.
fn sweep(mask: &[bool], width: usize, height: usize, size: u32, dominant: bool) -> Vec<bool> {
    let radius = usize::try_from(size / 2).unwrap_or(0);
    if radius == 0 || width == 0 || height == 0 {
        return mask.to_vec();
    }

    let mut horizontal = vec![!dominant; mask.len()];
    for row in 0..height {
        let offset = row * width;
        for column in 0..width {
            let start = column.saturating_sub(radius);
            let end = (column + radius).min(width - 1);
            if mask[offset + start..=offset + end].contains(&dominant) {
                horizontal[offset + column] = dominant;
            }
        }
    }

    let mut output = vec![!dominant; mask.len()];
    for row in 0..height {
        let start = row.saturating_sub(radius);
        let end = (row + radius).min(height - 1);
        for column in 0..width {
            if (start..=end).any(|r| horizontal[r * width + column] == dominant) {
                output[row * width + column] = dominant;
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&str]) -> (Vec<bool>, usize, usize) {
        let width = rows[0].len();
        let mask = rows
            .iter()
            .flat_map(|row| row.chars().map(|cell| cell == '#'))
            .collect();
        (mask, width, rows.len())
    }

    #[test]
    fn closing_fills_single_pixel_hole() {
        let (mask, width, height) = grid(&[
            "#######", "#######", "#######", "###.###", "#######", "#######", "#######",
        ]);

        let closed = close(&mask, width, height, 5);
        assert!(closed.iter().all(|cell| *cell));
    }

    #[test]
    fn opening_removes_isolated_speck() {
        let (mask, width, height) = grid(&[".......", ".......", "...#...", ".......", "......."]);

        let opened = open(&mask, width, height, 3);
        assert!(opened.iter().all(|cell| !*cell));
    }

    #[test]
    fn opening_preserves_wide_corridor() {
        let (mask, width, height) = grid(&[
            "........",
            "########",
            "########",
            "########",
            "........",
        ]);

        let opened = open(&mask, width, height, 3);
        assert_eq!(opened, mask);
    }

    #[test]
    fn unit_elements_leave_mask_untouched() {
        let (mask, width, height) = grid(&["#.#", ".#.", "#.#"]);
        assert_eq!(close(&mask, width, height, 1), mask);
        assert_eq!(open(&mask, width, height, 0), mask);
    }
}
