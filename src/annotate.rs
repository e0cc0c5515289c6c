// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Annotation planning.
//!
//! [`plan`] turns a metric outcome into an ordered list of [`DrawCommand`]s:
//! keypoint markers, skeleton segments, the imaginary-point overlay and the
//! text block, in that order. Rasterisation lives in
//! [`render`](crate::render) so the plan can be tested without an image.

use crate::imaginary::ImaginaryPoint;
use crate::metric::{Measurement, MetricId};
use crate::pose::{Point, Pose, Role, Side, resolve};

/// RGB color used by draw commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    /// Red color.
    pub const RED: Self = Self(255, 0, 0);
    /// Green color.
    pub const GREEN: Self = Self(0, 255, 0);
    /// Blue color.
    pub const BLUE: Self = Self(0, 0, 255);
    /// White color.
    pub const WHITE: Self = Self(255, 255, 255);

    /// Get a color from the pose palette by index.
    #[must_use]
    pub const fn from_pose_index(index: usize) -> Self {
        let color = POSE_COLORS[index % POSE_COLORS.len()];
        Self(color[0], color[1], color[2])
    }

    /// Channels as an array.
    #[must_use]
    pub const fn channels(&self) -> [u8; 3] {
        [self.0, self.1, self.2]
    }
}

/// Ultralytics Pose Color Palette
pub const POSE_COLORS: [[u8; 3]; 20] = [
    [255, 128, 0],   // #ff8000
    [255, 153, 51],  // #ff9933
    [255, 178, 102], // #ffb266
    [230, 230, 0],   // #e6e600
    [255, 153, 255], // #ff99ff
    [153, 204, 255], // #99ccff
    [255, 102, 255], // #ff66ff
    [255, 51, 255],  // #ff33ff
    [102, 178, 255], // #66b2ff
    [51, 153, 255],  // #3399ff
    [255, 153, 153], // #ff9999
    [255, 102, 102], // #ff6666
    [255, 51, 51],   // #ff3333
    [153, 255, 153], // #99ff99
    [102, 255, 102], // #66ff66
    [51, 255, 51],   // #33ff33
    [0, 255, 0],     // #00ff00
    [0, 0, 255],     // #0000ff
    [255, 0, 0],     // #ff0000
    [255, 255, 255], // #ffffff
];

const KEYPOINT_COLOR: Color = Color::from_pose_index(18);
const LIMB_COLOR: Color = Color::from_pose_index(0);
const IMAGINARY_COLOR: Color = Color::from_pose_index(9);
const LABEL_COLOR: Color = Color::GREEN;
const BANNER_COLOR: Color = Color::RED;

/// Stroke style for line segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    /// Continuous stroke.
    Solid,
    /// Alternating dashes and gaps, in pixels.
    Dashed {
        /// Dash length.
        dash: u32,
        /// Gap length.
        gap: u32,
    },
}

/// One primitive drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// A circular marker.
    Circle {
        /// Center.
        center: Point,
        /// Radius in pixels.
        radius: u32,
        /// Fill or stroke color.
        color: Color,
        /// Filled disc or hollow ring.
        filled: bool,
    },
    /// A straight segment.
    Line {
        /// Start point.
        from: Point,
        /// End point.
        to: Point,
        /// Stroke color.
        color: Color,
        /// Stroke width in pixels.
        thickness: u32,
        /// Solid or dashed.
        style: LineStyle,
    },
    /// A text label with its top-left corner at `origin`.
    Text {
        /// Top-left corner.
        origin: Point,
        /// Label contents.
        text: String,
        /// Text color.
        color: Color,
        /// Font size in pixels.
        size: f32,
    },
}

impl DrawCommand {
    /// Short operation name, useful for logging and tests.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Circle { .. } => "circle",
            Self::Line { .. } => "line",
            Self::Text { .. } => "text",
        }
    }
}

/// Everything the planner needs to describe one annotated image.
#[derive(Debug, Clone, Copy)]
pub struct Annotation<'a> {
    /// Metric being annotated.
    pub metric: MetricId,
    /// Side the metric was measured on.
    pub side: Side,
    /// Detected pose, or `None` when no pose was found.
    pub pose: Option<&'a Pose>,
    /// Successful measurement, if any.
    pub measurement: Option<&'a Measurement>,
    /// Image `(width, height)` used to scale marker and text sizes.
    pub image_dims: (u32, u32),
    /// Keypoints scoring above this get a marker and a name label.
    pub marker_threshold: f32,
}

/// Size factor relative to a 640 px image, clamped to a readable range.
fn scale_factor(image_dims: (u32, u32)) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let longest = image_dims.0.max(image_dims.1) as f32;
    (longest / 640.0).clamp(0.5, 3.0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(base: f32, factor: f32) -> u32 {
    (base * factor).round().max(1.0) as u32
}

/// Plan the overlay for one metric image.
///
/// Markers are drawn for keypoints scoring strictly above the marker
/// threshold. The hip-knee and knee-ankle segments for the measured side are
/// drawn when both ends pass the same threshold. When the measurement used an
/// imaginary point, a dashed segment and a hollow marker labelled
/// `Imaginary` follow. The text block comes last. Without a pose, only a
/// `No pose detected` banner is planned.
#[must_use]
pub fn plan(annotation: &Annotation<'_>) -> Vec<DrawCommand> {
    let factor = scale_factor(annotation.image_dims);
    let text_size = 20.0 * factor;
    let mut commands = Vec::new();

    let Some(pose) = annotation.pose else {
        commands.push(DrawCommand::Text {
            origin: Point::new(10.0, 10.0),
            text: "No pose detected".to_string(),
            color: BANNER_COLOR,
            size: text_size,
        });
        return commands;
    };

    let radius = scaled(4.0, factor);
    let label_size = 14.0 * factor;
    for kp in &pose.keypoints {
        if kp.score > annotation.marker_threshold && kp.point().is_finite() {
            commands.push(DrawCommand::Circle {
                center: kp.point(),
                radius,
                color: KEYPOINT_COLOR,
                filled: true,
            });
            commands.push(DrawCommand::Text {
                origin: Point::new(kp.x + 15.0 * factor, kp.y),
                text: kp.name.clone(),
                color: KEYPOINT_COLOR,
                size: label_size,
            });
        }
    }

    let thickness = scaled(2.0, factor);
    for (start, end) in [(Role::Hip, Role::Knee), (Role::Knee, Role::Ankle)] {
        let visible = |role| {
            resolve(pose, role, annotation.side)
                .filter(|kp| kp.score > annotation.marker_threshold)
        };
        if let (Some(from), Some(to)) = (visible(start), visible(end)) {
            commands.push(DrawCommand::Line {
                from: from.point(),
                to: to.point(),
                color: LIMB_COLOR,
                thickness,
                style: LineStyle::Solid,
            });
        }
    }

    if let Some(imaginary) = annotation.measurement.and_then(|m| m.imaginary) {
        push_imaginary(&mut commands, &imaginary, factor, label_size);
    }

    if let Some(measurement) = annotation.measurement {
        commands.push(DrawCommand::Text {
            origin: Point::new(10.0, 10.0),
            text: format!(
                "{}: {:.1}°",
                annotation.metric.display_name(),
                measurement.angle
            ),
            color: LABEL_COLOR,
            size: text_size,
        });
        commands.push(DrawCommand::Text {
            origin: Point::new(10.0, 10.0 + text_size * 1.5),
            text: format!("Side: {}", annotation.side),
            color: LABEL_COLOR,
            size: text_size * 0.8,
        });
    }

    commands
}

fn push_imaginary(
    commands: &mut Vec<DrawCommand>,
    imaginary: &ImaginaryPoint,
    factor: f32,
    label_size: f32,
) {
    commands.push(DrawCommand::Line {
        from: imaginary.base,
        to: imaginary.point,
        color: IMAGINARY_COLOR,
        thickness: scaled(2.0, factor),
        style: LineStyle::Dashed {
            dash: scaled(8.0, factor),
            gap: scaled(6.0, factor),
        },
    });
    commands.push(DrawCommand::Circle {
        center: imaginary.point,
        radius: scaled(6.0, factor),
        color: IMAGINARY_COLOR,
        filled: false,
    });
    commands.push(DrawCommand::Text {
        origin: Point::new(imaginary.point.x + 10.0 * factor, imaginary.point.y),
        text: "Imaginary".to_string(),
        color: IMAGINARY_COLOR,
        size: label_size,
    });
}
