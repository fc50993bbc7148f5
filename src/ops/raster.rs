//! Integer rasterization primitives.
//!
//! Pure geometry: every shape is a small value type whose `points()` returns a
//! fresh lazy iterator over the integer coordinates it covers. The same
//! iterators drive pixel painting and tile placement. Nothing here clips;
//! callers decide what an out-of-range coordinate means. Any i32 coordinate
//! is accepted; brush and neighbour offsets saturate at the edge of the range.

use std::collections::HashSet;

/// Integer coordinate (pixel or tile space).
pub type Point = (i32, i32);

// ============================================================================
// LINE
// ============================================================================

/// Brush stamped at each Bresenham sample of a thick line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BrushTip {
    #[default]
    Square,
    Diamond,
}

impl BrushTip {
    /// Offsets covered by a brush of the given width, centered on the sample.
    /// Even widths extend one cell further toward +x/+y.
    pub fn offsets(self, width: u32) -> Vec<Point> {
        if width <= 1 {
            return vec![(0, 0)];
        }
        let lo = -(((width - 1) / 2) as i32);
        let hi = (width / 2) as i32;
        let mut out = Vec::with_capacity((width * width) as usize);
        for dy in lo..=hi {
            for dx in lo..=hi {
                let keep = match self {
                    BrushTip::Square => true,
                    BrushTip::Diamond => dx.abs() + dy.abs() <= hi,
                };
                if keep {
                    out.push((dx, dy));
                }
            }
        }
        out
    }
}

/// Bresenham line between two points, inclusive of both endpoints.
///
/// Endpoints are stored lexicographically ordered, so `Line::new(a, b, w)` and
/// `Line::new(b, a, w)` cover exactly the same coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Line {
    start: Point,
    end: Point,
    width: u32,
    tip: BrushTip,
}

impl Line {
    pub fn new(p0: Point, p1: Point, width: u32) -> Self {
        let (start, end) = if p0 <= p1 { (p0, p1) } else { (p1, p0) };
        Self {
            start,
            end,
            width,
            tip: BrushTip::Square,
        }
    }

    pub fn with_tip(mut self, tip: BrushTip) -> Self {
        self.tip = tip;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// One-pixel centerline samples.
    pub fn samples(&self) -> Bresenham {
        Bresenham::new(self.start, self.end)
    }

    /// Every covered coordinate, each exactly once.
    pub fn points(&self) -> LinePoints {
        let thick = self.width > 1;
        LinePoints {
            samples: self.samples(),
            offsets: self.tip.offsets(self.width),
            seen: if thick { Some(HashSet::new()) } else { None },
            current: None,
            offset_idx: 0,
        }
    }
}

/// Centerline sample iterator.
#[derive(Clone, Debug)]
pub struct Bresenham {
    x: i32,
    y: i32,
    x1: i32,
    y1: i32,
    // error terms span twice the coordinate range
    dx: i64,
    dy: i64,
    sx: i32,
    sy: i32,
    err: i64,
    done: bool,
}

impl Bresenham {
    fn new(p0: Point, p1: Point) -> Self {
        let dx = i64::from(p0.0.abs_diff(p1.0));
        let dy = i64::from(p0.1.abs_diff(p1.1));
        Self {
            x: p0.0,
            y: p0.1,
            x1: p1.0,
            y1: p1.1,
            dx,
            dy,
            sx: if p0.0 < p1.0 { 1 } else { -1 },
            sy: if p0.1 < p1.1 { 1 } else { -1 },
            err: dx - dy,
            done: false,
        }
    }
}

impl Iterator for Bresenham {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        if self.done {
            return None;
        }
        let out = (self.x, self.y);
        if self.x == self.x1 && self.y == self.y1 {
            self.done = true;
            return Some(out);
        }
        let e2 = 2 * self.err;
        if e2 > -self.dy {
            self.err -= self.dy;
            self.x += self.sx;
        }
        if e2 < self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }
        Some(out)
    }
}

/// Coordinates of a (possibly thick) line.
#[derive(Clone, Debug)]
pub struct LinePoints {
    samples: Bresenham,
    offsets: Vec<Point>,
    /// Only thick lines can revisit a coordinate.
    seen: Option<HashSet<Point>>,
    current: Option<Point>,
    offset_idx: usize,
}

impl Iterator for LinePoints {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        loop {
            if let Some((cx, cy)) = self.current {
                while self.offset_idx < self.offsets.len() {
                    let (ox, oy) = self.offsets[self.offset_idx];
                    self.offset_idx += 1;
                    let p = (cx.saturating_add(ox), cy.saturating_add(oy));
                    match self.seen.as_mut() {
                        Some(seen) => {
                            if seen.insert(p) {
                                return Some(p);
                            }
                        }
                        None => return Some(p),
                    }
                }
            }
            self.current = Some(self.samples.next()?);
            self.offset_idx = 0;
        }
    }
}

// ============================================================================
// RECTANGLE
// ============================================================================

/// Closed axis-aligned rectangle. Corners may be given in any order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rectangle {
    min: Point,
    max: Point,
}

impl Rectangle {
    pub fn new(p0: Point, p1: Point) -> Self {
        Self {
            min: (p0.0.min(p1.0), p0.1.min(p1.1)),
            max: (p0.0.max(p1.0), p0.1.max(p1.1)),
        }
    }

    pub fn min(&self) -> Point {
        self.min
    }

    pub fn max(&self) -> Point {
        self.max
    }

    /// Saturates at `u32::MAX` for a rectangle spanning every i32.
    pub fn width(&self) -> u32 {
        self.min.0.abs_diff(self.max.0).saturating_add(1)
    }

    pub fn height(&self) -> u32 {
        self.min.1.abs_diff(self.max.1).saturating_add(1)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.0 >= self.min.0 && p.0 <= self.max.0 && p.1 >= self.min.1 && p.1 <= self.max.1
    }

    /// All covered coordinates, row-major.
    pub fn points(&self) -> RectPoints {
        RectPoints {
            rect: *self,
            next: Some(self.min),
        }
    }

    /// Perimeter coordinates only, row-major.
    pub fn outline(&self) -> impl Iterator<Item = Point> {
        let rect = *self;
        self.points().filter(move |&(x, y)| {
            x == rect.min.0 || x == rect.max.0 || y == rect.min.1 || y == rect.max.1
        })
    }
}

#[derive(Clone, Debug)]
pub struct RectPoints {
    rect: Rectangle,
    next: Option<Point>,
}

impl Iterator for RectPoints {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let p = self.next?;
        self.next = if p.0 < self.rect.max.0 {
            Some((p.0 + 1, p.1))
        } else if p.1 < self.rect.max.1 {
            Some((self.rect.min.0, p.1 + 1))
        } else {
            None
        };
        Some(p)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next {
            None => (0, Some(0)),
            Some((x, y)) => {
                let w = self.rect.min.0.abs_diff(self.rect.max.0) as usize + 1;
                let rows_after = y.abs_diff(self.rect.max.1) as usize;
                let n = rows_after
                    .checked_mul(w)
                    .and_then(|n| n.checked_add(x.abs_diff(self.rect.max.0) as usize + 1));
                (n.unwrap_or(usize::MAX), n)
            }
        }
    }
}

// ============================================================================
// CIRCLE
// ============================================================================

/// Midpoint circle. The filled variant covers every boundary cell plus the
/// span between the mirrored extents on each row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Circle {
    center: Point,
    radius: u32,
    filled: bool,
}

impl Circle {
    pub fn new(center: Point, radius: u32, filled: bool) -> Self {
        Self {
            center,
            radius,
            filled,
        }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Boundary |dx| values per |dy| from the 8-way midpoint walk, sorted and
    /// de-duplicated. Index is |dy| in `0..=radius`.
    fn boundary_rows(&self) -> Vec<Vec<i32>> {
        let r = self.radius as i32;
        let mut rows: Vec<Vec<i32>> = vec![Vec::new(); self.radius as usize + 1];
        let mut x = r;
        let mut y = 0;
        let mut err = 1 - r;
        while x >= y {
            rows[y as usize].push(x);
            rows[x as usize].push(y);
            y += 1;
            if err < 0 {
                err += 2 * y + 1;
            } else {
                x -= 1;
                err += 2 * (y - x) + 1;
            }
        }
        for row in &mut rows {
            row.sort_unstable();
            row.dedup();
        }
        rows
    }

    /// Covered coordinates, row-major.
    pub fn points(&self) -> CirclePoints {
        CirclePoints {
            center: self.center,
            filled: self.filled,
            rows: self.boundary_rows(),
            dy: -(self.radius as i32),
            radius: self.radius as i32,
            row: Vec::new(),
            row_idx: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CirclePoints {
    center: Point,
    filled: bool,
    rows: Vec<Vec<i32>>,
    dy: i32,
    radius: i32,
    /// dx values of the row currently being emitted
    row: Vec<i32>,
    row_idx: usize,
}

impl CirclePoints {
    fn load_row(&mut self) {
        let xs = &self.rows[self.dy.unsigned_abs() as usize];
        self.row.clear();
        self.row_idx = 0;
        if self.filled {
            let outer = xs.last().copied().unwrap_or(0);
            self.row.extend(-outer..=outer);
        } else {
            self.row.extend(xs.iter().rev().filter(|&&v| v != 0).map(|&v| -v));
            self.row.extend(xs.iter().copied());
        }
    }
}

impl Iterator for CirclePoints {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        while self.row_idx >= self.row.len() {
            if self.dy > self.radius {
                return None;
            }
            self.load_row();
            self.dy += 1;
        }
        let dx = self.row[self.row_idx];
        self.row_idx += 1;
        // dy was advanced past the loaded row
        Some((
            self.center.0.saturating_add(dx),
            self.center.1.saturating_add(self.dy - 1),
        ))
    }
}

// ============================================================================
// FLOOD FILL
// ============================================================================

/// Iterative 4-connected flood fill.
///
/// `qualifies` is asked about each coordinate at most once and must answer
/// from the pre-edit state; the whole region is collected before the caller
/// mutates anything. Returns an empty region when the seed itself fails.
/// The predicate must reject coordinates outside the fillable area.
pub fn flood_fill<F>(seed: Point, mut qualifies: F) -> Vec<Point>
where
    F: FnMut(Point) -> bool,
{
    if !qualifies(seed) {
        return Vec::new();
    }
    let mut visited: HashSet<Point> = HashSet::new();
    visited.insert(seed);
    let mut stack: Vec<Point> = Vec::with_capacity(256);
    stack.push(seed);
    let mut region = Vec::new();

    while let Some((x, y)) = stack.pop() {
        region.push((x, y));
        for n in [
            (x.saturating_sub(1), y),
            (x.saturating_add(1), y),
            (x, y.saturating_sub(1)),
            (x, y.saturating_add(1)),
        ] {
            if visited.insert(n) && qualifies(n) {
                stack.push(n);
            }
        }
    }
    region
}

/// [`flood_fill`] restricted to `bounds`.
pub fn flood_fill_bounded<F>(seed: Point, bounds: Rectangle, mut qualifies: F) -> Vec<Point>
where
    F: FnMut(Point) -> bool,
{
    flood_fill(seed, |p| bounds.contains(p) && qualifies(p))
}
