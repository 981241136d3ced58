use crate::constants::{BASELINE_SHAPE_RATIO, BASELINE_TILE_TOTAL};
use crate::error::{GameError, GameResult};
use crate::rng::Rng;
use crate::types::{
    BoardView, BonusKind, Direction, Position, PushRecord, Shape, TileView, TreasureId,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Openings(u8);

impl Openings {
    fn bit(dir: Direction) -> u8 {
        match dir {
            Direction::Up => 0b0001,
            Direction::Right => 0b0010,
            Direction::Down => 0b0100,
            Direction::Left => 0b1000,
        }
    }

    fn from_dirs(dirs: &[Direction]) -> Self {
        Self(dirs.iter().fold(0, |acc, dir| acc | Self::bit(*dir)))
    }

    fn contains(self, dir: Direction) -> bool {
        self.0 & Self::bit(dir) != 0
    }

    fn rotated(self) -> Self {
        let dirs: Vec<Direction> = Direction::ALL
            .into_iter()
            .filter(|dir| self.contains(*dir))
            .map(Direction::clockwise)
            .collect();
        Self::from_dirs(&dirs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    openings: Openings,
    shape: Shape,
    pub fixed: bool,
    pub treasure: Option<TreasureId>,
    pub bonus: Option<BonusKind>,
}

impl Tile {
    /// Tile of `shape` turned clockwise `quarter_turns` times from its base
    /// orientation (corner: up+right, straight: up+down, cross: all but left).
    pub fn new(shape: Shape, quarter_turns: usize) -> Self {
        let base = match shape {
            Shape::Corner => Openings::from_dirs(&[Direction::Up, Direction::Right]),
            Shape::Straight => Openings::from_dirs(&[Direction::Up, Direction::Down]),
            Shape::Cross => {
                Openings::from_dirs(&[Direction::Up, Direction::Right, Direction::Down])
            }
        };
        let mut tile = Self {
            openings: base,
            shape,
            fixed: false,
            treasure: None,
            bonus: None,
        };
        for _ in 0..quarter_turns % 4 {
            tile.rotate();
        }
        tile
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn is_open(&self, dir: Direction) -> bool {
        self.openings.contains(dir)
    }

    pub fn openings(&self) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|dir| self.openings.contains(*dir))
            .collect()
    }

    pub fn rotate(&mut self) {
        self.openings = self.openings.rotated();
    }

    pub fn view(&self) -> TileView {
        TileView {
            openings: self.openings(),
            shape: self.shape,
            fixed: self.fixed,
            treasure: self.treasure,
            bonus: self.bonus,
        }
    }
}

fn distinct_rotations(shape: Shape) -> usize {
    match shape {
        Shape::Straight => 2,
        Shape::Corner | Shape::Cross => 4,
    }
}

#[derive(Clone, Debug)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Tile>,
    spare: Option<Tile>,
    last_push: Option<PushRecord>,
}

impl Board {
    pub fn generate(rows: usize, cols: usize, rng: &mut Rng) -> GameResult<Self> {
        if rows < 3 || cols < 3 {
            return Err(GameError::InvalidOptions(format!(
                "board {rows}x{cols} is too small"
            )));
        }

        let mut slots: Vec<Option<Tile>> = vec![None; rows * cols];
        let mut fixed_cross_count = 0;
        for row in 0..rows {
            for col in 0..cols {
                let pos = Position::new(row, col);
                if !is_fixed_cell(pos, rows, cols) {
                    continue;
                }
                let mut tile = match corner_turns(pos, rows, cols) {
                    Some(turns) => Tile::new(Shape::Corner, turns),
                    None => {
                        fixed_cross_count += 1;
                        let turns = match edge_cross_turns(pos, rows, cols) {
                            Some(turns) => turns,
                            None => rng.pick_index(4),
                        };
                        Tile::new(Shape::Cross, turns)
                    }
                };
                tile.fixed = true;
                slots[row * cols + col] = Some(tile);
            }
        }

        let mut bag = shape_bag(rows * cols + 1, fixed_cross_count);
        rng.shuffle(&mut bag);

        for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
            let shape = bag.pop().ok_or(GameError::GenerationFailed)?;
            *slot = Some(Tile::new(shape, rng.pick_index(distinct_rotations(shape))));
        }
        let spare_shape = bag.pop().ok_or(GameError::GenerationFailed)?;
        let spare = Tile::new(spare_shape, rng.pick_index(distinct_rotations(spare_shape)));

        let cells = slots
            .into_iter()
            .collect::<Option<Vec<Tile>>>()
            .ok_or(GameError::GenerationFailed)?;

        Ok(Self {
            rows,
            cols,
            cells,
            spare: Some(spare),
            last_push: None,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    pub fn tile(&self, pos: Position) -> Option<&Tile> {
        if !self.in_bounds(pos) {
            return None;
        }
        self.cells.get(pos.row * self.cols + pos.col)
    }

    pub fn tile_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        if !self.in_bounds(pos) {
            return None;
        }
        self.cells.get_mut(pos.row * self.cols + pos.col)
    }

    pub fn spare(&self) -> Option<&Tile> {
        self.spare.as_ref()
    }

    pub fn last_push(&self) -> Option<PushRecord> {
        self.last_push
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| Position::new(row, col)))
    }

    pub fn corners(&self) -> [Position; 4] {
        [
            Position::new(0, 0),
            Position::new(0, self.cols - 1),
            Position::new(self.rows - 1, self.cols - 1),
            Position::new(self.rows - 1, 0),
        ]
    }

    pub fn is_corner(&self, pos: Position) -> bool {
        corner_turns(pos, self.rows, self.cols).is_some()
    }

    pub fn line_len(&self, direction: Direction) -> usize {
        if direction.is_vertical() {
            self.rows
        } else {
            self.cols
        }
    }

    /// Number of lines a push in `direction` can address.
    pub fn line_count(&self, direction: Direction) -> usize {
        if direction.is_vertical() {
            self.cols
        } else {
            self.rows
        }
    }

    /// True when pushing `index` towards `direction` undoes the last push.
    pub fn is_reversal(&self, index: usize, direction: Direction) -> bool {
        self.last_push
            .map(|last| last.index == index && last.direction == direction.opposite())
            .unwrap_or(false)
    }

    /// Cells of the addressed line, from the insertion end to the ejection end.
    pub fn line_positions(&self, index: usize, direction: Direction) -> Vec<Position> {
        let len = self.line_len(direction);
        (0..len)
            .map(|step| match direction {
                Direction::Down => Position::new(step, index),
                Direction::Up => Position::new(len - 1 - step, index),
                Direction::Right => Position::new(index, step),
                Direction::Left => Position::new(index, len - 1 - step),
            })
            .collect()
    }

    /// Where a pawn at `pos` ends up after the push, and whether it wrapped
    /// around to the opposite edge. `None` when the pawn is not on the line.
    pub fn shifted_position(
        &self,
        pos: Position,
        index: usize,
        direction: Direction,
    ) -> Option<(Position, bool)> {
        let line = self.line_positions(index, direction);
        let at = line.iter().position(|cell| *cell == pos)?;
        match line.get(at + 1) {
            Some(next) => Some((*next, false)),
            None => line.first().map(|first| (*first, true)),
        }
    }

    pub fn check_push(
        &self,
        index: usize,
        direction: Direction,
        using_fixed_override: bool,
    ) -> GameResult<()> {
        if index >= self.line_count(direction) {
            return Err(GameError::IndexOutOfRange { index, direction });
        }
        if self.spare.is_none() {
            return Err(GameError::NoSpareTile);
        }
        let line = self.line_positions(index, direction);
        let ejected_fixed = line
            .last()
            .and_then(|pos| self.tile(*pos))
            .map(|tile| tile.fixed)
            .unwrap_or(false);
        if ejected_fixed && !using_fixed_override {
            return Err(GameError::FixedLine(index));
        }
        Ok(())
    }

    pub fn push(
        &mut self,
        index: usize,
        direction: Direction,
        using_fixed_override: bool,
    ) -> GameResult<()> {
        self.check_push(index, direction, using_fixed_override)?;
        let mut carried = self.spare.take().ok_or(GameError::NoSpareTile)?;
        for pos in self.line_positions(index, direction) {
            let slot = pos.row * self.cols + pos.col;
            carried = std::mem::replace(&mut self.cells[slot], carried);
        }

        if using_fixed_override {
            self.recompute_fixed();
            carried.fixed = false;
        }
        self.spare = Some(carried);
        self.last_push = Some(PushRecord { index, direction });
        Ok(())
    }

    pub fn rotate_spare(&mut self) -> GameResult<()> {
        let spare = self.spare.as_mut().ok_or(GameError::NoSpareTile)?;
        spare.rotate();
        Ok(())
    }

    fn recompute_fixed(&mut self) {
        let (rows, cols) = (self.rows, self.cols);
        for (slot, tile) in self.cells.iter_mut().enumerate() {
            tile.fixed = is_fixed_cell(Position::new(slot / cols, slot % cols), rows, cols);
        }
    }

    pub fn find_treasure(&self, treasure: TreasureId) -> Option<Position> {
        self.positions().find(|pos| {
            self.tile(*pos)
                .map(|tile| tile.treasure == Some(treasure))
                .unwrap_or(false)
        })
    }

    pub fn bonuses_on_board(&self) -> usize {
        self.cells.iter().filter(|tile| tile.bonus.is_some()).count()
    }

    pub fn view(&self) -> BoardView {
        BoardView {
            rows: self.rows,
            cols: self.cols,
            tiles: self
                .cells
                .chunks(self.cols)
                .map(|row| row.iter().map(Tile::view).collect())
                .collect(),
            spare_tile: self.spare.as_ref().map(Tile::view),
            last_push: self.last_push,
        }
    }
}

/// Corners plus the lattice of cells at even offsets from the edges.
pub fn is_fixed_cell(pos: Position, rows: usize, cols: usize) -> bool {
    corner_turns(pos, rows, cols).is_some() || (pos.row % 2 == 0 && pos.col % 2 == 0)
}

/// Quarter turns that point a corner tile's openings into the board.
fn corner_turns(pos: Position, rows: usize, cols: usize) -> Option<usize> {
    let top = pos.row == 0;
    let bottom = pos.row + 1 == rows;
    let left = pos.col == 0;
    let right = pos.col + 1 == cols;
    match (top, bottom, left, right) {
        (true, _, true, _) => Some(1),
        (true, _, _, true) => Some(2),
        (_, true, _, true) => Some(3),
        (_, true, true, _) => Some(0),
        _ => None,
    }
}

/// Edge junctions keep their closed side against the border.
fn edge_cross_turns(pos: Position, rows: usize, cols: usize) -> Option<usize> {
    if pos.row == 0 {
        Some(1)
    } else if pos.row + 1 == rows {
        Some(3)
    } else if pos.col == 0 {
        Some(0)
    } else if pos.col + 1 == cols {
        Some(2)
    } else {
        None
    }
}

/// Movable shapes for a board of `total_tiles` (cells + spare), scaled from
/// the 7x7 ratio. Rounding surplus goes to straights.
fn shape_bag(total_tiles: usize, fixed_cross_count: usize) -> Vec<Shape> {
    let (corner_ratio, cross_ratio, _) = BASELINE_SHAPE_RATIO;
    let corner_total = total_tiles * corner_ratio / BASELINE_TILE_TOTAL;
    let cross_total = total_tiles * cross_ratio / BASELINE_TILE_TOTAL;
    let straight_total = total_tiles - corner_total - cross_total;

    let mut bag = Vec::with_capacity(total_tiles);
    bag.extend(std::iter::repeat(Shape::Corner).take(corner_total.saturating_sub(4)));
    bag.extend(std::iter::repeat(Shape::Cross).take(cross_total.saturating_sub(fixed_cross_count)));
    bag.extend(std::iter::repeat(Shape::Straight).take(straight_total));
    bag
}
