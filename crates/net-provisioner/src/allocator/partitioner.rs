//! Deterministic CIDR partitioner
//!
//! Pure functions over IPv4 blocks. Address arithmetic is done on the `u32`
//! representation of the network address, widened to `u64` so that stepping
//! past the end of the IPv4 space is detected instead of wrapping.

use crate::{Error, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

const ADDRESS_BITS: u8 = 32;

/// Parse a CIDR string into a block normalised to its network address
///
/// `10.0.0.5/8` parses as `10.0.0.0/8`.
pub fn parse_block(cidr: &str) -> Result<Ipv4Net> {
    let block: Ipv4Net = cidr
        .trim()
        .parse()
        .map_err(|e| Error::InvalidAddressSpace(format!("'{}': {}", cidr, e)))?;
    Ok(block.trunc())
}

/// Number of addresses in a block of the given prefix length
fn block_size(prefix_len: u8) -> u64 {
    1u64 << (ADDRESS_BITS - prefix_len)
}

fn ip_to_u64(ip: Ipv4Addr) -> u64 {
    u64::from(u32::from(ip))
}

/// Smallest prefix length that splits `parent` into at least `min_segments` blocks
///
/// Equals `parent.prefix_len() + ceil(log2(min_segments))`.
pub fn split_cidr(parent: Ipv4Net, min_segments: u32) -> Result<u8> {
    if min_segments < 1 {
        return Err(Error::InvalidAddressSpace(
            "Number of segments must be at least 1".to_string(),
        ));
    }

    let bits = if min_segments == 1 {
        0
    } else {
        (ADDRESS_BITS as u32 - (min_segments - 1).leading_zeros()) as u8
    };

    let bitmask = parent.prefix_len() + bits;
    if bitmask > ADDRESS_BITS {
        return Err(Error::InvalidAddressSpace(format!(
            "{} cannot be split into {} segments",
            parent, min_segments
        )));
    }

    Ok(bitmask)
}

/// Re-base a block onto a longer (or equal) prefix length, keeping its base address
pub fn rebase(block: Ipv4Net, prefix_len: u8) -> Result<Ipv4Net> {
    if prefix_len < block.prefix_len() {
        return Err(Error::InvalidAddressSpace(format!(
            "Prefix length /{} is shorter than block {}",
            prefix_len, block
        )));
    }

    Ok(Ipv4Net::new(block.network(), prefix_len)?.trunc())
}

/// The `index`-th block (0-based) of `block`'s own size, counted from `block`'s base
pub fn nth_sub_block(block: Ipv4Net, index: u64) -> Result<Ipv4Net> {
    let size = block_size(block.prefix_len());
    let start = index
        .checked_mul(size)
        .and_then(|offset| offset.checked_add(ip_to_u64(block.network())))
        .filter(|start| {
            start
                .checked_add(size - 1)
                .map_or(false, |end| end <= u64::from(u32::MAX))
        })
        .ok_or_else(|| {
            Error::InvalidAddressSpace(format!(
                "Block #{} after {} is outside the IPv4 address space",
                index, block
            ))
        })?;

    Ok(Ipv4Net::new(Ipv4Addr::from(start as u32), block.prefix_len())?)
}

/// Number of `/prefix_len` blocks that fit in `parent`
pub fn capacity(parent: Ipv4Net, prefix_len: u8) -> u64 {
    if prefix_len < parent.prefix_len() || prefix_len > ADDRESS_BITS {
        return 0;
    }
    1u64 << (prefix_len - parent.prefix_len())
}

/// `count` contiguous `/bitmask` blocks carved from `parent`, ascending from its base
pub fn minimal_subnet_list(parent: Ipv4Net, count: usize, bitmask: u8) -> Result<Vec<Ipv4Net>> {
    let first = rebase(parent, bitmask)?;

    if count as u64 > capacity(parent, bitmask) {
        return Err(Error::InvalidAddressSpace(format!(
            "{} cannot hold {} /{} subnets",
            parent, count, bitmask
        )));
    }

    (0..count as u64)
        .map(|index| nth_sub_block(first, index))
        .collect()
}

/// The `index`-th `/child_bitmask` slice of `parent`
///
/// This is how a member block is derived from its regional block: rebase the
/// regional block to the member bitmask, then pick the assignment's slice.
/// Slices that would fall outside `parent` are rejected.
pub fn derive_sub_block(parent: Ipv4Net, index: u64, child_bitmask: u8) -> Result<Ipv4Net> {
    let first = rebase(parent, child_bitmask)?;

    if index >= capacity(parent, child_bitmask) {
        return Err(Error::InvalidAddressSpace(format!(
            "Slice #{} of /{} exceeds address space {}",
            index, child_bitmask, parent
        )));
    }

    nth_sub_block(first, index)
}
