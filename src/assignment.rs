use crate::{
    error::PlacementError,
    field::{find_pallet, CargoBox, Pallet},
};
use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use tracing::info;

/// Box that may never be placed on the pallet carrying its own number
pub const REDIRECTED_BOX_ID: u8 = 2;

/// One row of the shelf draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub shelf_slot: u8,
    pub box_id: u8,
}

/// Draw a box number for every shelf slot.
///
/// Numbers are drawn with replacement so the same box can show up in several slots.
/// The table is only reported, placement goes through [`destination_pallet`].
pub fn draw<R: Rng + ?Sized>(slot_count: u8, rng: &mut R) -> Vec<Assignment> {
    (1..=slot_count)
        .map(|shelf_slot| Assignment {
            shelf_slot,
            box_id: rng.gen_range(1..=slot_count),
        })
        .collect()
}

pub fn log_assignment(assignment: &[Assignment]) {
    info!("Shelf draw:");
    for entry in assignment {
        info!("  shelf {}: box {}", entry.shelf_slot, entry.box_id);
    }
}

/// Pick the pallet a box goes to.
///
/// Every box goes onto the pallet with its own number except box 2,
/// which goes onto any other pallet chosen at random.
pub fn destination_pallet<'p, R: Rng + ?Sized>(
    cargo: &CargoBox,
    pallets: &'p [Pallet],
    rng: &mut R,
) -> Result<&'p Pallet, PlacementError> {
    if cargo.id() == REDIRECTED_BOX_ID {
        let candidates: Vec<&Pallet> = pallets
            .iter()
            .filter(|pallet| pallet.id() != REDIRECTED_BOX_ID)
            .collect();
        candidates
            .choose(rng)
            .copied()
            .ok_or(PlacementError::NoAlternativePallet)
    } else {
        find_pallet(pallets, cargo.id()).ok_or(PlacementError::MissingPallet(cargo.id()))
    }
}
