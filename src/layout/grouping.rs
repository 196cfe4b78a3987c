//! Virtual tab grouping over an unchanged grid layout
//!
//! Group membership is metadata: none of these functions touch
//! `grid_layout`, so dissolving a group can never lose a block's position.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::constants::validation::MIN_GROUP_MEMBERS;
use crate::types::{GridItem, ModeLayoutState, RenderItem, TabGroup};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupingError {
    #[error("a tab group needs at least two blocks, got {0}")]
    TooFewBlocks(usize),
    #[error("block '{0}' is not in the grid layout")]
    UnknownBlock(String),
    #[error("block '{block}' already belongs to group '{group}'")]
    AlreadyGrouped { block: String, group: String },
    #[error("block '{0}' is listed more than once")]
    DuplicateBlock(String),
    #[error("no tab group '{0}'")]
    UnknownGroup(String),
    #[error("block '{block}' is not a member of group '{group}'")]
    NotAMember { block: String, group: String },
    #[error("new order is not a permutation of the members of group '{0}'")]
    NotAPermutation(String),
    #[error("index {index} is out of range for group '{group}' with {len} members")]
    IndexOutOfRange { group: String, index: usize, len: usize },
}

/// Outcome of removing a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRemoval {
    /// The group lives on with the remaining members
    Removed,
    /// Fewer than two members were left, so the group was deleted
    Dissolved,
}

/// Append a new group whose id is `block_ids[0]`; returns that id
pub fn create_group(state: &mut ModeLayoutState, block_ids: &[String]) -> Result<String, GroupingError> {
    if block_ids.len() < MIN_GROUP_MEMBERS {
        return Err(GroupingError::TooFewBlocks(block_ids.len()));
    }

    let mut seen = HashSet::new();
    for block_id in block_ids {
        if !seen.insert(block_id.as_str()) {
            return Err(GroupingError::DuplicateBlock(block_id.clone()));
        }
        check_free_block(state, block_id)?;
    }

    let group = TabGroup::from_members(block_ids.to_vec(), 0)
        .ok_or(GroupingError::TooFewBlocks(0))?;
    let id = group.id.clone();
    state.tab_groups.push(group);
    Ok(id)
}

/// Delete a group record; member blocks stay where they are
pub fn dissolve_group(state: &mut ModeLayoutState, group_id: &str) -> Result<TabGroup, GroupingError> {
    let index = group_index(state, group_id)?;
    Ok(state.tab_groups.remove(index))
}

/// Append `block_id` as the last tab of a group
pub fn add_member(state: &mut ModeLayoutState, group_id: &str, block_id: &str) -> Result<(), GroupingError> {
    let index = group_index(state, group_id)?;
    check_free_block(state, block_id)?;
    state.tab_groups[index].block_ids.push(block_id.to_string());
    Ok(())
}

/// Remove a member, dissolving the group when fewer than two would remain
///
/// The primary (and so the group id) moves to the new first member. The
/// active tab stays on the same block when that block survives.
pub fn remove_member(
    state: &mut ModeLayoutState,
    group_id: &str,
    block_id: &str,
) -> Result<MemberRemoval, GroupingError> {
    let index = group_index(state, group_id)?;
    let group = &mut state.tab_groups[index];
    let position = group.position_of(block_id).ok_or_else(|| GroupingError::NotAMember {
        block: block_id.to_string(),
        group: group_id.to_string(),
    })?;

    if group.block_ids.len() - 1 < MIN_GROUP_MEMBERS {
        state.tab_groups.remove(index);
        return Ok(MemberRemoval::Dissolved);
    }

    let previous_active = group.active_index;
    let active_id = group.active_block_id().map(str::to_string);
    group.block_ids.remove(position);
    group.id = group.block_ids[0].clone();
    group.active_index = active_id
        .and_then(|id| group.position_of(&id))
        .unwrap_or_else(|| previous_active.min(group.block_ids.len() - 1));
    Ok(MemberRemoval::Removed)
}

/// Replace the member order; returns the group's new id (`new_order[0]`)
pub fn reorder_members(
    state: &mut ModeLayoutState,
    group_id: &str,
    new_order: &[String],
) -> Result<String, GroupingError> {
    let index = group_index(state, group_id)?;
    let group = &mut state.tab_groups[index];

    let mut current: Vec<&String> = group.block_ids.iter().collect();
    let mut proposed: Vec<&String> = new_order.iter().collect();
    current.sort();
    proposed.sort();
    if current != proposed {
        return Err(GroupingError::NotAPermutation(group_id.to_string()));
    }

    let active_id = group.active_block_id().map(str::to_string);
    group.block_ids = new_order.to_vec();
    group.id = group.block_ids[0].clone();
    group.active_index = active_id
        .and_then(|id| group.position_of(&id))
        .unwrap_or(0);
    Ok(group.id.clone())
}

/// Select the visible tab of a group
pub fn set_active(state: &mut ModeLayoutState, group_id: &str, active_index: usize) -> Result<(), GroupingError> {
    let index = group_index(state, group_id)?;
    let group = &mut state.tab_groups[index];
    if active_index >= group.block_ids.len() {
        return Err(GroupingError::IndexOutOfRange {
            group: group_id.to_string(),
            index: active_index,
            len: group.block_ids.len(),
        });
    }
    group.active_index = active_index;
    Ok(())
}

/// Project the grid into the list of items a block-grid widget renders
///
/// Walks the grid in stored order: non-primary members are skipped, a
/// primary stands in for its whole group using its own footprint, and every
/// other block is emitted as-is. The result has one item per ungrouped block
/// plus one per group.
pub fn compute_effective_items<'a>(grid_layout: &'a [GridItem], tab_groups: &'a [TabGroup]) -> Vec<RenderItem<'a>> {
    let mut primaries: HashMap<&str, &TabGroup> = HashMap::with_capacity(tab_groups.len());
    let mut hidden: HashSet<&str> = HashSet::new();
    for group in tab_groups {
        if let Some((primary, rest)) = group.block_ids.split_first() {
            primaries.insert(primary.as_str(), group);
            hidden.extend(rest.iter().map(String::as_str));
        }
    }

    grid_layout
        .iter()
        .filter(|item| !hidden.contains(item.id.as_str()))
        .map(|item| match primaries.get(item.id.as_str()) {
            Some(&group) => RenderItem::TabGroup { grid_item: item, group },
            None => RenderItem::Block { grid_item: item },
        })
        .collect()
}

fn group_index(state: &ModeLayoutState, group_id: &str) -> Result<usize, GroupingError> {
    state
        .group_index(group_id)
        .ok_or_else(|| GroupingError::UnknownGroup(group_id.to_string()))
}

fn check_free_block(state: &ModeLayoutState, block_id: &str) -> Result<(), GroupingError> {
    if !state.contains_block(block_id) {
        return Err(GroupingError::UnknownBlock(block_id.to_string()));
    }
    if let Some(group) = state.group_of(block_id) {
        return Err(GroupingError::AlreadyGrouped {
            block: block_id.to_string(),
            group: group.id.clone(),
        });
    }
    Ok(())
}
