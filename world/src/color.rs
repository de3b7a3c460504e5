//! sRGB to CIELAB conversion used to classify map pixels.

use std::sync::OnceLock;

const WHITE_X: f32 = 0.950_47;
const WHITE_Y: f32 = 1.0;
const WHITE_Z: f32 = 1.088_83;
const EPSILON: f32 = 216.0 / 24_389.0;
const KAPPA: f32 = 24_389.0 / 27.0;

/// Colour expressed in the CIELAB space under a D65 white point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Lab {
    pub(crate) l: f32,
    pub(crate) a: f32,
    pub(crate) b: f32,
}

impl Lab {
    /// Converts an 8-bit sRGB triple into CIELAB.
    pub(crate) fn from_srgb(rgb: [u8; 3]) -> Self {
        let table = linear_table();
        let [r, g, b] = rgb.map(|channel| table[usize::from(channel)]);

        let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / WHITE_X;
        let y = (0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b) / WHITE_Y;
        let z = (0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b) / WHITE_Z;

        let (fx, fy, fz) = (pivot(x), pivot(y), pivot(z));
        Self {
            l: 116.0 * fy - 16.0,
            a: 500.0 * (fx - fy),
            b: 200.0 * (fy - fz),
        }
    }

    /// CIE76 colour difference.
    pub(crate) fn distance(self, other: Lab) -> f32 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        (dl * dl + da * da + db * db).sqrt()
    }
}

fn pivot(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

fn linear_table() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0; 256];
        for (value, slot) in table.iter_mut().enumerate() {
            let encoded = value as f32 / 255.0;
            *slot = if encoded <= 0.040_45 {
                encoded / 12.92
            } else {
                ((encoded + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    })
}
