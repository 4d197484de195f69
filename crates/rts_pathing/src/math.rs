//! Fixed-point and integer geometry for deterministic movement.
//!
//! Exact unit positions, velocities and speeds use fixed-point arithmetic.
//! Map and bounding-box geometry uses whole pixels. Floating-point
//! operations can produce different results on different CPUs, so neither
//! layer ever touches `f32`/`f64`.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Exact position of a pixel point.
    #[must_use]
    pub fn from_point(p: Point) -> Self {
        Self::new(Fixed::from_num(p.x), Fixed::from_num(p.y))
    }

    /// Pixel containing this position (floor).
    #[must_use]
    pub fn to_point(self) -> Point {
        Point::new(self.x.floor().to_num(), self.y.floor().to_num())
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Scale by a scalar.
    #[must_use]
    pub fn scale(self, k: Fixed) -> Self {
        Self::new(self.x * k, self.y * k)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = value.max(Fixed::ONE) + Fixed::ONE;

    // 64 halvings cover every representable bit of I32F32.
    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        if mid == low {
            break;
        }
        if mid.saturating_mul(mid) <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Integer square root (floor).
#[must_use]
pub fn isqrt(value: u64) -> u64 {
    if value < 2 {
        return value;
    }
    let mut x = value;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + value / x) / 2;
    }
    x
}

/// A whole-pixel map coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate in pixels.
    pub x: i32,
    /// Y coordinate in pixels (grows downward).
    pub y: i32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> u64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        (dx * dx + dy * dy) as u64
    }

    /// Euclidean distance rounded down to whole pixels.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        isqrt(self.distance_squared(other)) as u32
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Half-open axis-aligned rectangle `[left, right) × [top, bottom)` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Inclusive left edge.
    pub left: i32,
    /// Inclusive top edge.
    pub top: i32,
    /// Exclusive right edge.
    pub right: i32,
    /// Exclusive bottom edge.
    pub bottom: i32,
}

impl Rect {
    /// Create a rectangle from its edges.
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Square of half-size `radius` around a point.
    #[must_use]
    pub const fn around(center: Point, radius: i32) -> Self {
        Self::new(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        )
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// True when the rectangle covers no pixel.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Center pixel.
    #[must_use]
    pub const fn center(&self) -> Point {
        Point::new(
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }

    /// True when the point lies inside the half-open area.
    #[must_use]
    pub const fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }

    /// True when `other` lies entirely inside `self`.
    #[must_use]
    pub const fn contains_rect(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.right <= self.right
            && other.top >= self.top
            && other.bottom <= self.bottom
    }

    /// True when the two areas share at least one pixel.
    #[must_use]
    pub const fn overlaps(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Grow every side by `amount` pixels.
    #[must_use]
    pub const fn expand(&self, amount: i32) -> Self {
        Self::new(
            self.left - amount,
            self.top - amount,
            self.right + amount,
            self.bottom + amount,
        )
    }

    /// Smallest rectangle covering both.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Bounding rectangle of a segment, inclusive of both endpoints.
    #[must_use]
    pub fn spanning(a: Point, b: Point) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            a.x.max(b.x) + 1,
            a.y.max(b.y) + 1,
        )
    }

    /// Closest point of the closed area `[left, right] × [top, bottom]` to `p`.
    #[must_use]
    pub fn clamp_closed(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.left, self.right),
            p.y.clamp(self.top, self.bottom),
        )
    }
}

/// A heading in 1/256ths of a full turn; 0 faces north, 64 east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Heading(pub u8);

impl Heading {
    /// Heading of the vector `(dx, dy)` with y growing downward.
    ///
    /// Uses a linear arctangent inside each octant, which keeps the result
    /// integer-only and within a few 1/256ths of the true angle.
    #[must_use]
    pub fn from_delta(dx: i64, dy: i64) -> Self {
        if dx == 0 && dy == 0 {
            return Self(0);
        }
        let ax = dx.abs();
        let ay = dy.abs();
        // Angle from the nearest vertical axis, in 1/256ths (0..=32).
        let off_vertical = if ay >= ax {
            ax * 32 / ay
        } else {
            64 - ay * 32 / ax
        };
        let angle = match (dx >= 0, dy < 0) {
            (true, true) => off_vertical,
            (true, false) => 128 - off_vertical,
            (false, false) => 128 + off_vertical,
            (false, true) => 256 - off_vertical,
        };
        Self((angle & 0xff) as u8)
    }

    /// Turn toward `target` by at most `rate` steps, taking the short way.
    #[must_use]
    pub fn turn_toward(self, target: Heading, rate: u8) -> Self {
        let diff = target.0.wrapping_sub(self.0) as i8;
        let rate = i16::from(rate.min(127));
        let step = i16::from(diff).clamp(-rate, rate);
        Self(self.0.wrapping_add(step as u8))
    }
}

/// Exact rational number with a positive denominator, for segment tests.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ratio {
    pub num: i64,
    pub den: i64,
}

impl Ratio {
    pub(crate) fn new(num: i64, den: i64) -> Self {
        if den < 0 {
            Self { num: -num, den: -den }
        } else {
            Self { num, den }
        }
    }

    pub(crate) fn lt_int(self, v: i64) -> bool {
        i128::from(self.num) < i128::from(v) * i128::from(self.den)
    }

    pub(crate) fn gt_int(self, v: i64) -> bool {
        i128::from(self.num) > i128::from(v) * i128::from(self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(0));
        let b = Vec2Fixed::new(Fixed::from_num(0), Fixed::from_num(4));
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_vec2_normalize() {
        let v = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(4));
        let norm = v.normalize();
        let len_sq = norm.dot(norm);
        let epsilon = Fixed::ONE / Fixed::from_num(10000);
        assert!((len_sq - Fixed::ONE).abs() < epsilon, "got {len_sq:?}");
        let ratio_diff = norm.x * Fixed::from_num(4) - norm.y * Fixed::from_num(3);
        assert!(ratio_diff.abs() < epsilon);
    }

    #[test]
    fn test_fixed_sqrt_exact_squares() {
        assert_eq!(fixed_sqrt(Fixed::from_num(25)), Fixed::from_num(5));
        assert_eq!(fixed_sqrt(Fixed::from_num(0)), Fixed::ZERO);
        assert_eq!(fixed_sqrt(Fixed::from_num(1)), Fixed::ONE);
    }

    #[test]
    fn test_isqrt() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(24), 4);
        assert_eq!(isqrt(25), 5);
        assert_eq!(isqrt(u64::from(u32::MAX) * u64::from(u32::MAX)), u64::from(u32::MAX));
    }

    #[test]
    fn test_point_distance() {
        assert_eq!(Point::new(0, 0).distance(Point::new(3, 4)), 5);
        assert_eq!(Point::new(-3, 0).distance(Point::new(0, 4)), 5);
    }

    #[test]
    fn test_rect_overlap_is_half_open() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.overlaps(&Rect::new(9, 9, 20, 20)));
        assert!(!a.overlaps(&Rect::new(10, 0, 20, 10)));
        assert!(a.contains(Point::new(0, 0)));
        assert!(!a.contains(Point::new(10, 5)));
    }

    #[test]
    fn test_heading_cardinals() {
        assert_eq!(Heading::from_delta(0, -5), Heading(0));
        assert_eq!(Heading::from_delta(5, 0), Heading(64));
        assert_eq!(Heading::from_delta(0, 5), Heading(128));
        assert_eq!(Heading::from_delta(-5, 0), Heading(192));
        assert_eq!(Heading::from_delta(5, -5), Heading(32));
    }

    #[test]
    fn test_heading_turns_short_way() {
        assert_eq!(Heading(250).turn_toward(Heading(10), 8), Heading(2));
        assert_eq!(Heading(10).turn_toward(Heading(250), 8), Heading(2));
        assert_eq!(Heading(10).turn_toward(Heading(12), 8), Heading(12));
    }

    #[test]
    fn test_fixed_point_round_trip() {
        let p = Point::new(17, -3);
        assert_eq!(Vec2Fixed::from_point(p).to_point(), p);
    }
}
