use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::draw::{FrameBuffer, Rgba};
use super::text::{for_each_lit_pixel, line_height, text_width};

pub const LABEL_SCALE: i32 = 2;

/// A rasterized text mask, drawn in any color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelBitmap {
    width: i32,
    height: i32,
    lit: Vec<bool>,
}

impl LabelBitmap {
    pub fn rasterize(text: &str, scale: i32) -> Self {
        let width = text_width(text, scale).max(0);
        let height = line_height(scale) - 2 * scale.max(1);
        let mut lit = vec![false; (width * height).max(0) as usize];
        for_each_lit_pixel(text, scale, |x, y| {
            if (0..width).contains(&x) && (0..height).contains(&y) {
                lit[(y * width + x) as usize] = true;
            }
        });
        Self { width, height, lit }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn draw(&self, buf: &mut FrameBuffer<'_>, x: i32, y: i32, color: Rgba) {
        if self.width == 0 {
            return;
        }
        for (index, lit) in self.lit.iter().enumerate() {
            if *lit {
                let index = index as i32;
                buf.blend(x + index % self.width, y + index / self.width, color);
            }
        }
    }
}

/// Damage badges rasterized once per distinct value for one view. Values no
/// token showed during the last frame are dropped at the end of that frame.
#[derive(Debug, Default)]
pub struct DamageLabelCache {
    labels: HashMap<i32, LabelBitmap>,
    touched: HashSet<i32>,
}

impl DamageLabelCache {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, damage: i32) -> bool {
        self.labels.contains_key(&damage)
    }

    pub fn label(&mut self, damage: i32) -> &LabelBitmap {
        self.touched.insert(damage);
        self.labels.entry(damage).or_insert_with(|| {
            debug!(damage, "damage_label_rasterized");
            LabelBitmap::rasterize(&damage.to_string(), LABEL_SCALE)
        })
    }

    pub fn end_frame(&mut self) {
        let touched = std::mem::take(&mut self.touched);
        self.labels.retain(|damage, _| touched.contains(damage));
    }
}
