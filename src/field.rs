use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field coordinate, one unit is one motor step
pub type Position = na::Point2<i32>;

/// A detected cargo box
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CargoBox {
    id: u8,
    position: Position,
}

impl CargoBox {
    pub fn new(id: u8, (x, y): (i32, i32)) -> Self {
        Self {
            id,
            position: Position::new(x, y),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn position(&self) -> &Position {
        &self.position
    }
}

impl fmt::Display for CargoBox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "box {} at [{}, {}]",
            self.id, self.position.x, self.position.y
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pallet {
    id: u8,
    position: Position,
}

impl Pallet {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn position(&self) -> &Position {
        &self.position
    }
}

/// Pallet layout of the competition field.
///
/// Positions are listed in pallet id order, the first one is pallet 1.
#[derive(Deserialize, Debug, Clone)]
pub struct FieldConfig {
    pub pallets: Vec<(i32, i32)>,
}

impl FieldConfig {
    pub fn pallets(&self) -> Vec<Pallet> {
        self.pallets
            .iter()
            .enumerate()
            .map(|(index, &(x, y))| Pallet {
                id: (index + 1) as u8,
                position: Position::new(x, y),
            })
            .collect()
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            pallets: vec![(0, 0), (100, 0), (200, 0), (300, 0), (400, 0), (500, 0)],
        }
    }
}

pub fn find_pallet(pallets: &[Pallet], id: u8) -> Option<&Pallet> {
    pallets.iter().find(|pallet| pallet.id == id)
}
