use opencv::core::{Mat, Point, Rect, Size};
use opencv::imgproc;
use opencv::prelude::*;

use crate::detect::Detection;
use crate::error::Result;

use super::color::{color_for, Color};

const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;

const BOX_THICKNESS: i32 = 3;
const CENTER_RADIUS: i32 = 4;
const LABEL_FONT_SCALE: f64 = 0.8;
const LABEL_THICKNESS: i32 = 2;
const LABEL_PADDING: i32 = 5;
const LABEL_OFFSET: i32 = 10;

pub const BANNER_TEXT: &str = "non-detected";
pub const BANNER_BACKGROUND: Color = Color(0, 0, 139);
const BANNER_FONT_SCALE: f64 = 2.0;
const BANNER_THICKNESS: i32 = 3;
const BANNER_PADDING: i32 = 10;

/// Text shown above a detection box.
pub fn label_for(detection: &Detection, class_names: Option<&[String]>) -> String {
    match class_names.and_then(|names| names.get(detection.class_id)) {
        Some(name) => format!("{} {:.2}", name, detection.confidence),
        None => format!(
            "cls:{} conf:{:.2}",
            detection.class_id, detection.confidence
        ),
    }
}

/// Draws detections onto a copy of `image`. An empty detection list gets
/// the "non-detected" banner instead.
pub fn annotate(
    image: &Mat,
    detections: &[Detection],
    class_names: Option<&[String]>,
) -> Result<Mat> {
    let mut canvas = image.try_clone()?;

    if detections.is_empty() {
        draw_banner(&mut canvas)?;
        return Ok(canvas);
    }

    for detection in detections {
        draw_detection(&mut canvas, detection, class_names)?;
    }
    Ok(canvas)
}

fn draw_detection(
    canvas: &mut Mat,
    detection: &Detection,
    class_names: Option<&[String]>,
) -> Result<()> {
    let [x1, y1, x2, y2] = detection.bbox;
    let color = color_for(detection.class_id);

    imgproc::rectangle_points(
        canvas,
        Point::new(x1, y1),
        Point::new(x2, y2),
        color.to_scalar(),
        BOX_THICKNESS,
        imgproc::LINE_8,
        0,
    )?;

    let (cx, cy) = detection.center();
    imgproc::circle(
        canvas,
        Point::new(cx, cy),
        CENTER_RADIUS,
        color.darkened().to_scalar(),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;

    let label = label_for(detection, class_names);
    let mut baseline = 0;
    let text = imgproc::get_text_size(&label, FONT, LABEL_FONT_SCALE, LABEL_THICKNESS, &mut baseline)?;

    // Keep the label inside the top edge
    let label_y = (y1 - LABEL_OFFSET).max(text.height + LABEL_PADDING);
    imgproc::rectangle_points(
        canvas,
        Point::new(x1, label_y - text.height - LABEL_PADDING),
        Point::new(x1 + text.width + LABEL_PADDING * 2, label_y + baseline),
        color.to_scalar(),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        canvas,
        &label,
        Point::new(x1 + LABEL_PADDING, label_y - LABEL_PADDING),
        FONT,
        LABEL_FONT_SCALE,
        color.contrasting_text().to_scalar(),
        LABEL_THICKNESS,
        imgproc::LINE_8,
        false,
    )?;

    Ok(())
}

/// Background rectangle of the "non-detected" banner for a raster of `size`.
pub fn banner_rect(size: Size) -> Result<Rect> {
    let (text, baseline, origin) = banner_layout(size)?;
    Ok(Rect::new(
        origin.x - BANNER_PADDING,
        origin.y - text.height - BANNER_PADDING,
        text.width + BANNER_PADDING * 2,
        text.height + baseline + BANNER_PADDING * 2,
    ))
}

fn banner_layout(size: Size) -> Result<(Size, i32, Point)> {
    let mut baseline = 0;
    let text = imgproc::get_text_size(
        BANNER_TEXT,
        FONT,
        BANNER_FONT_SCALE,
        BANNER_THICKNESS,
        &mut baseline,
    )?;
    let origin = Point::new(
        size.width / 2 - text.width / 2,
        size.height / 2 + text.height / 2,
    );
    Ok((text, baseline, origin))
}

fn draw_banner(canvas: &mut Mat) -> Result<()> {
    let size = canvas.size()?;
    let (_, _, origin) = banner_layout(size)?;

    imgproc::rectangle(
        canvas,
        banner_rect(size)?,
        BANNER_BACKGROUND.to_scalar(),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        canvas,
        BANNER_TEXT,
        origin,
        FONT,
        BANNER_FONT_SCALE,
        Color(255, 255, 255).to_scalar(),
        BANNER_THICKNESS,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};

    fn gray(width: i32, height: i32) -> Mat {
        Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(128.0)).unwrap()
    }

    fn pixel(mat: &Mat, x: i32, y: i32) -> [u8; 3] {
        mat.at_2d::<Vec3b>(y, x).unwrap().0
    }

    fn detection(bbox: [i32; 4], class_id: usize) -> Detection {
        Detection {
            bbox,
            confidence: 0.87,
            class_id,
        }
    }

    #[test]
    fn test_label_uses_class_names_when_available() {
        let names = vec!["cat".to_string(), "dog".to_string()];
        let d = detection([0, 0, 1, 1], 1);
        assert_eq!(label_for(&d, Some(&names)), "dog 0.87");
        assert_eq!(label_for(&d, None), "cls:1 conf:0.87");

        let unknown = detection([0, 0, 1, 1], 5);
        assert_eq!(label_for(&unknown, Some(&names)), "cls:5 conf:0.87");
    }

    #[test]
    fn test_empty_detections_draw_banner() {
        let image = gray(640, 480);
        let annotated = annotate(&image, &[], None).unwrap();
        let rect = banner_rect(Size::new(640, 480)).unwrap();

        assert!(rect.x > 0 && rect.y > 0);
        assert_eq!(pixel(&annotated, rect.x + 2, rect.y + 2), [0, 0, 139]);
        assert_eq!(pixel(&annotated, rect.x + rect.width - 3, rect.y + 2), [0, 0, 139]);
        assert_eq!(pixel(&image, rect.x + 2, rect.y + 2), [128, 128, 128]);
    }

    #[test]
    fn test_detections_never_draw_banner() {
        let image = gray(640, 480);
        let annotated = annotate(&image, &[detection([20, 300, 120, 400], 0)], None).unwrap();
        let rect = banner_rect(Size::new(640, 480)).unwrap();

        assert_eq!(pixel(&annotated, rect.x + 2, rect.y + 2), [128, 128, 128]);
        assert_eq!(pixel(&annotated, rect.x + rect.width - 3, rect.y + 2), [128, 128, 128]);
    }

    #[test]
    fn test_box_and_center_colors() {
        let image = gray(640, 480);
        let annotated = annotate(&image, &[detection([100, 200, 300, 400], 1)], None).unwrap();

        // Left edge of the box in palette color 1
        assert_eq!(pixel(&annotated, 100, 300), [255, 0, 0]);
        // Center dot in the darkened color
        assert_eq!(pixel(&annotated, 200, 300), [178, 0, 0]);
        // Interior untouched
        assert_eq!(pixel(&annotated, 150, 350), [128, 128, 128]);
        // Input raster untouched
        assert_eq!(pixel(&image, 100, 300), [128, 128, 128]);
    }

    #[test]
    fn test_label_background_clamped_to_top() {
        let image = gray(640, 480);
        let annotated = annotate(&image, &[detection([50, 0, 200, 100], 0)], None).unwrap();

        // Below the box's top stroke and the text baseline, so only the
        // clamped label background can color these
        assert_eq!(pixel(&annotated, 52, 20), [0, 255, 0]);
        assert_eq!(pixel(&annotated, 60, 20), [0, 255, 0]);
        // Further down the box interior is untouched
        assert_eq!(pixel(&annotated, 60, 60), [128, 128, 128]);
    }
}
