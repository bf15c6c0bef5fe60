mod annotate;
mod color;
mod encode;

pub use annotate::{annotate, banner_rect, label_for, BANNER_BACKGROUND, BANNER_TEXT};
pub use color::{color_for, Color, PALETTE};
pub use encode::encode_jpeg;
