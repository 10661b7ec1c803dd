//! Scale plan computation.
//!
//! ```text
//! current == desired  → NoOp
//! current >  desired  → ScaleDown: remove the (current - desired) highest indices
//! current <  desired  → ScaleUp:
//!     template_count = desired + (highest + 1 - current)   if highest != 0
//!                    = desired                             otherwise
//!     index_offset   = highest + 1                         availability sets only
//! ```
//!
//! Templates lay out nodes `0..template_count` and the provider keeps
//! VMs that already exist, so with holes below `highest` the count has
//! to grow by the number of holes for the range to reach past the
//! surviving nodes.

use serde::Serialize;

use crate::error::{ScaleError, ScaleResult};
use crate::inventory::NodeInventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    NoOp,
    ScaleDown,
    ScaleUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalePlan {
    pub direction: Direction,
    pub current_count: u32,
    pub desired_count: u32,
    pub highest_used_index: Option<u32>,
    /// Count handed to the template generator.
    pub template_count: u32,
    /// First index for new VMs (availability-set scale-up only).
    pub index_offset: Option<u32>,
    /// VMs to drain and delete, highest index first (availability-set
    /// scale-down only; scale sets shrink through the template).
    pub to_remove: Vec<String>,
}

impl ScalePlan {
    /// Fails only when the index arithmetic would leave the `u32` range.
    pub fn compute(inventory: &NodeInventory, desired_count: u32) -> ScaleResult<Self> {
        let current_count = inventory.current_count();
        let highest_used_index = inventory.highest_used_index();

        let mut plan = ScalePlan {
            direction: Direction::NoOp,
            current_count,
            desired_count,
            highest_used_index,
            template_count: desired_count,
            index_offset: None,
            to_remove: Vec::new(),
        };

        if current_count > desired_count {
            plan.direction = Direction::ScaleDown;
            if !inventory.is_scale_set() {
                plan.to_remove = inventory.highest_indexed((current_count - desired_count) as usize);
            }
        } else if current_count < desired_count {
            plan.direction = Direction::ScaleUp;
            let overflow = || ScaleError::IndexOverflow {
                highest: highest_used_index.unwrap_or_default(),
                desired: desired_count,
            };
            let next_index = match highest_used_index {
                Some(h) => h.checked_add(1).ok_or_else(overflow)?,
                None => 0,
            };
            if highest_used_index.is_some_and(|h| h != 0) {
                let holes = next_index.saturating_sub(current_count);
                plan.template_count = desired_count.checked_add(holes).ok_or_else(overflow)?;
            }
            if !inventory.is_scale_set() {
                plan.index_offset = Some(next_index);
            }
        }

        Ok(plan)
    }

    pub fn is_noop(&self) -> bool {
        self.direction == Direction::NoOp
    }
}
