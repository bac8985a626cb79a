//! Ken-Burns style motion planning.
//!
//! The source image is cover-fit to the target frame; if the scaled
//! image has no usable vertical overflow, a small extra zoom creates
//! one. The visible window then travels linearly from the start offset
//! to the end offset over the clip duration, centered on the
//! orthogonal axis.

use sreel_models::{CameraMotion, Resolution};

/// Axis the window actually travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionAxis {
    Vertical,
    Horizontal,
    Still,
}

/// Concrete plan for one clip's motion.
#[derive(Debug, Clone)]
pub struct MotionPlan {
    /// Image size after cover-fit and extra zoom
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Target window size
    pub target_width: u32,
    pub target_height: u32,
    pub axis: MotionAxis,
    /// Crop offsets in scaled-image coordinates
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
}

impl MotionPlan {
    /// Plan the motion for a source image and target frame.
    pub fn compute(
        source_width: u32,
        source_height: u32,
        resolution: Resolution,
        motion: CameraMotion,
    ) -> Self {
        let (target_w, target_h) = resolution;
        let source_w = source_width.max(1) as f64;
        let source_h = source_height.max(1) as f64;
        let tw = target_w as f64;
        let th = target_h as f64;

        // Cover fit: fill the entire frame without distortion.
        let cover_scale = (tw / source_w).max(th / source_h);
        let scaled_w = source_w * cover_scale;
        let scaled_h = source_h * cover_scale;

        // Prefer top-to-bottom travel; without vertical overflow of at
        // least max(24px, 8% of target height), zoom in to create it.
        let min_vertical_pan = 24.0_f64.max(th * 0.08);
        let extra_zoom = if (scaled_h - th) < min_vertical_pan {
            (th + min_vertical_pan) / scaled_h.max(1.0)
        } else {
            1.0
        };

        let final_w = (scaled_w * extra_zoom).round().max(tw) as u32;
        let final_h = (scaled_h * extra_zoom).round().max(th) as u32;
        let overflow_x = (final_w as f64 - tw).max(0.0);
        let overflow_y = (final_h as f64 - th).max(0.0);

        let vertical_possible = overflow_y > 1.0;
        let horizontal_possible = overflow_x > 1.0;

        let axis = match motion {
            CameraMotion::Horizontal if horizontal_possible => MotionAxis::Horizontal,
            CameraMotion::Horizontal if vertical_possible => MotionAxis::Vertical,
            CameraMotion::Vertical | CameraMotion::Auto if vertical_possible => MotionAxis::Vertical,
            CameraMotion::Vertical | CameraMotion::Auto if horizontal_possible => {
                MotionAxis::Horizontal
            }
            _ => MotionAxis::Still,
        };

        let (start_x, start_y, end_x, end_y) = match axis {
            MotionAxis::Vertical => (overflow_x / 2.0, 0.0, overflow_x / 2.0, overflow_y),
            MotionAxis::Horizontal => (0.0, overflow_y / 2.0, overflow_x, overflow_y / 2.0),
            MotionAxis::Still => (
                overflow_x / 2.0,
                overflow_y / 2.0,
                overflow_x / 2.0,
                overflow_y / 2.0,
            ),
        };

        Self {
            scaled_width: final_w,
            scaled_height: final_h,
            target_width: target_w,
            target_height: target_h,
            axis,
            start_x,
            start_y,
            end_x,
            end_y,
        }
    }

    /// Filter fragment: scale to the planned size, then crop a
    /// traveling window over `duration` seconds.
    pub fn to_filter(&self, duration: f64) -> String {
        let duration = duration.max(0.1);
        let x_expr = linear_expr(self.start_x, self.end_x, duration);
        let y_expr = linear_expr(self.start_y, self.end_y, duration);
        format!(
            "scale={}:{},crop={}:{}:x='{}':y='{}'",
            self.scaled_width,
            self.scaled_height,
            self.target_width,
            self.target_height,
            x_expr,
            y_expr,
        )
    }
}

fn linear_expr(start: f64, end: f64, duration: f64) -> String {
    if (end - start).abs() < f64::EPSILON {
        format!("{start:.2}")
    } else {
        format!("{start:.2}+({end:.2}-{start:.2})*min(t/{duration:.3},1)")
    }
}
