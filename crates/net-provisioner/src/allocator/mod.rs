//! Address space partitioning
//!
//! Provides deterministic carving of CIDR blocks:
//! - prefix lengths needed to split a block into N segments
//! - the N-th block of a given size after a base block
//! - contiguous subnet lists and indexed sub-blocks within a parent

mod partitioner;

pub use partitioner::{
    capacity, derive_sub_block, minimal_subnet_list, nth_sub_block, parse_block, rebase,
    split_cidr,
};
