//! Milling driver: feeds a pose stream through [`Stock::intersect`].

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use vmill_kernel_cutter::Cutter;
use vmill_kernel_math::{Point3, Pose};

use crate::stock::{IntersectionResult, Stock, StoredData, ToolPose};

/// Output of one driver step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Step number, starting at 1.
    pub step: u64,
    /// Stock version after the step.
    pub version: u64,
    /// Step statistics.
    pub result: IntersectionResult,
    /// Voxel delta.
    pub data: StoredData,
}

/// Applies poses to a stock one at a time, in order, keeping running totals.
#[derive(Debug)]
pub struct MillingDriver<I> {
    stock: Stock,
    cutter: Cutter,
    poses: I,
    steps: u64,
    totals: IntersectionResult,
}

impl<I> MillingDriver<I>
where
    I: Iterator<Item = ToolPose>,
{
    /// Drive `cutter` through `poses` against `stock`.
    pub fn new(stock: Stock, cutter: Cutter, poses: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            stock,
            cutter,
            poses: poses.into_iter(),
            steps: 0,
            totals: IntersectionResult::default(),
        }
    }

    /// Apply the next pose. `None` once the stream is exhausted.
    pub fn step(&mut self) -> Option<StepOutput> {
        let pose = self.poses.next()?;
        let (result, data) = self.stock.intersect(&self.cutter, &pose);
        self.steps += 1;
        self.totals += result;
        Some(StepOutput {
            step: self.steps,
            version: self.stock.version(),
            result,
            data,
        })
    }

    /// Apply every remaining pose, discarding the deltas. Returns the totals
    /// over the whole run.
    pub fn run(&mut self) -> IntersectionResult {
        while self.step().is_some() {}
        self.totals
    }

    /// Totals over the steps taken so far.
    pub fn totals(&self) -> IntersectionResult {
        self.totals
    }

    /// Number of steps taken.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Stock being milled.
    pub fn stock(&self) -> &Stock {
        &self.stock
    }

    /// Tool in use.
    pub fn cutter(&self) -> &Cutter {
        &self.cutter
    }

    /// Give back the stock.
    pub fn into_stock(self) -> Stock {
        self.stock
    }
}

impl<I> Iterator for MillingDriver<I>
where
    I: Iterator<Item = ToolPose>,
{
    type Item = StepOutput;

    fn next(&mut self) -> Option<StepOutput> {
        self.step()
    }
}

/// Poses along a straight move, both ends included, spaced at most
/// `step_len` apart. A zero-length move yields a single pose. The cutter
/// keeps its default orientation.
pub fn linear_path(from: Point3, to: Point3, step_len: f64) -> impl Iterator<Item = ToolPose> {
    let length = (to - from).norm();
    let n = if length > 0.0 { segments(length, step_len) } else { 0 };
    (0..=n).map(move |i| {
        let t = i as f64 / n.max(1) as f64;
        ToolPose::cutter_at(from + (to - from) * t)
    })
}

/// Poses along a polyline, each corner visited once.
pub fn polyline_path(points: &[Point3], step_len: f64) -> Vec<ToolPose> {
    let mut poses = Vec::new();
    if let Some(first) = points.first() {
        poses.push(ToolPose::cutter_at(*first));
    }
    for pair in points.windows(2) {
        poses.extend(linear_path(pair[0], pair[1], step_len).skip(1));
    }
    poses
}

/// Arc direction in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcDir {
    /// Clockwise.
    Cw,
    /// Counter-clockwise.
    Ccw,
}

/// Poses along a helical arc around `center` in the XY plane, `from`
/// excluded, `to` included. Z is interpolated linearly.
pub fn arc_path(
    from: Point3,
    to: Point3,
    center: Point3,
    dir: ArcDir,
    step_len: f64,
) -> Vec<ToolPose> {
    let r = (from.x - center.x).hypot(from.y - center.y);
    let start_angle = (from.y - center.y).atan2(from.x - center.x);
    let end_angle = (to.y - center.y).atan2(to.x - center.x);

    let delta = match dir {
        ArcDir::Ccw => {
            let mut d = end_angle - start_angle;
            if d <= 0.0 {
                d += 2.0 * PI;
            }
            d
        }
        ArcDir::Cw => {
            let mut d = start_angle - end_angle;
            if d <= 0.0 {
                d += 2.0 * PI;
            }
            -d
        }
    };

    let n = segments(delta.abs() * r, step_len);
    let angle_step = delta / n as f64;
    let z_step = (to.z - from.z) / n as f64;
    (1..=n)
        .map(|i| {
            let angle = start_angle + angle_step * i as f64;
            let z = from.z + z_step * i as f64;
            ToolPose::cutter_at(Point3::new(
                center.x + r * angle.cos(),
                center.y + r * angle.sin(),
                z,
            ))
        })
        .collect()
}

/// Re-express poses for a stock placed at `stock`.
pub fn with_stock_pose(
    poses: impl IntoIterator<Item = ToolPose>,
    stock: Pose,
) -> impl Iterator<Item = ToolPose> {
    poses.into_iter().map(move |p| ToolPose { stock, ..p })
}

fn segments(length: f64, step_len: f64) -> usize {
    if step_len > 0.0 && length.is_finite() {
        ((length / step_len).ceil() as usize).max(1)
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_path_spacing() {
        let poses: Vec<_> =
            linear_path(Point3::new(0.0, 0.0, 5.0), Point3::new(10.0, 0.0, 5.0), 3.0).collect();
        assert_eq!(poses.len(), 5);
        assert_eq!(poses[0].cutter.origin(), Point3::new(0.0, 0.0, 5.0));
        assert_relative_eq!(poses[4].cutter.origin(), Point3::new(10.0, 0.0, 5.0));
        assert_relative_eq!(poses[1].cutter.origin().x, 2.5);
    }

    #[test]
    fn test_degenerate_linear_path() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let poses: Vec<_> = linear_path(p, p, 1.0).collect();
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].cutter.origin(), p);

        // a repeated corner adds nothing to a polyline
        let poses = polyline_path(&[Point3::origin(), p, p], 10.0);
        assert_eq!(poses.len(), 2);
    }

    #[test]
    fn test_polyline_shares_corners() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(4.0, 4.0, 0.0),
        ];
        let poses = polyline_path(&pts, 2.0);
        assert_eq!(poses.len(), 5);
        assert_relative_eq!(poses[2].cutter.origin(), pts[1]);
        assert_relative_eq!(poses[4].cutter.origin(), pts[2]);
    }

    #[test]
    fn test_arc_path_ccw() {
        let poses = arc_path(
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, -2.0),
            Point3::origin(),
            ArcDir::Ccw,
            1.0,
        );
        assert_eq!(poses.len(), 16);
        let last = poses.last().unwrap().cutter.origin();
        assert_relative_eq!(last, Point3::new(0.0, 10.0, -2.0), epsilon = 1e-9);
        for p in &poses {
            let o = p.cutter.origin();
            assert_relative_eq!(o.x.hypot(o.y), 10.0, epsilon = 1e-9);
            assert!(o.x >= -1e-9 && o.y >= -1e-9);
        }
    }

    #[test]
    fn test_arc_path_cw_goes_the_long_way() {
        let poses = arc_path(
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            Point3::origin(),
            ArcDir::Cw,
            1.0,
        );
        // three quarters of the circle, through negative y
        assert!(poses.iter().any(|p| p.cutter.origin().y < -9.0));
    }

    #[test]
    fn test_driver_steps_in_order() {
        let stock = Stock::from_bounds([0.0, 0.0, 0.0, 20.0, 20.0, 10.0], 4).unwrap();
        let cutter = Cutter::cylinder(2.0, 20.0).unwrap();
        let path = linear_path(Point3::new(2.0, 10.0, 6.0), Point3::new(18.0, 10.0, 6.0), 2.0);
        let mut driver = MillingDriver::new(stock, cutter, path);

        let first = driver.step().unwrap();
        assert_eq!(first.step, 1);
        assert_eq!(first.version, 1);
        assert!(first.result.waste > 0.0);

        let rest: Vec<_> = driver.by_ref().collect();
        assert_eq!(rest.len(), 8);
        assert!(rest.windows(2).all(|w| w[1].version == w[0].version + 1));
        let summed: IntersectionResult = std::iter::once(first.result)
            .chain(rest.iter().map(|s| s.result))
            .sum();
        assert_eq!(driver.totals().purged_leaves, summed.purged_leaves);
        assert_relative_eq!(driver.totals().waste, summed.waste);
        assert_eq!(driver.steps(), 9);
        assert!(driver.step().is_none());
    }

    #[test]
    fn test_run_with_moving_stock() {
        let cutter = Cutter::sphere(1.5).unwrap();
        let path: Vec<_> =
            linear_path(Point3::new(1.0, 5.0, 5.0), Point3::new(9.0, 5.0, 5.0), 1.0).collect();

        let bounds = [0.0, 0.0, 0.0, 10.0, 10.0, 10.0];

        let mut fixed = MillingDriver::new(
            Stock::from_bounds(bounds, 4).unwrap(),
            cutter.clone(),
            path.clone(),
        );
        let fixed_totals = fixed.run();

        // stock and tool shifted together: same cut
        let shift = Pose::translation(0.0, 50.0, 0.0);
        let shifted_path = path
            .into_iter()
            .map(|p| ToolPose::new(shift, shift.then(&p.cutter)));
        let mut shifted =
            MillingDriver::new(Stock::from_bounds(bounds, 4).unwrap(), cutter, shifted_path);
        let shifted_totals = shifted.run();

        assert_eq!(fixed_totals.pushed_leaves, shifted_totals.pushed_leaves);
        assert_eq!(fixed_totals.purged_leaves, shifted_totals.purged_leaves);
        assert_relative_eq!(fixed_totals.waste, shifted_totals.waste, epsilon = 1e-9);
        assert_relative_eq!(
            fixed.stock().remaining_volume(),
            shifted.into_stock().remaining_volume(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_with_stock_pose() {
        let stock = Pose::translation(1.0, 0.0, 0.0);
        let path = linear_path(Point3::origin(), Point3::new(1.0, 0.0, 0.0), 1.0);
        let poses: Vec<_> = with_stock_pose(path, stock).collect();
        assert!(poses.iter().all(|p| p.stock == stock));
        assert_eq!(poses[1].cutter.origin(), Point3::new(1.0, 0.0, 0.0));
    }
}
