// Rimewatch: Rank-Attack Detection for RPL Low-Power Networks
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Wire formats of the three datagram types.
//!
//! All packets are fixed-layout with multi-byte fields in little-endian order (the native order of
//! the sensor platform). Addresses travel as their 16 raw octets. There are no version fields;
//! evolving a format requires a port change.

use std::net::Ipv6Addr;
use thiserror::Error;

/// UDP port on which nodes listen for mapping requests.
pub const MAPPER_CLIENT_PORT: u16 = 4713;
/// UDP port on which the root listens for mapping replies.
pub const MAPPER_SERVER_PORT: u16 = 4714;
/// UDP port from which nodes send filter-install requests.
pub const FW_CONF_CLIENT_PORT: u16 = 4715;
/// UDP port on which the root listens for filter-install requests.
pub const FW_CONF_SERVER_PORT: u16 = 4716;

/// Decoding error for the fixed-layout packet formats.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the layout was complete.
    #[error("packet truncated: wanted {wanted} more bytes, {remaining} left")]
    Truncated {
        /// Bytes the decoder still needed.
        wanted: usize,
        /// Bytes that were left in the buffer.
        remaining: usize,
    },
    /// The buffer holds more bytes than the layout describes.
    #[error("{0} trailing bytes after packet end")]
    TrailingBytes(usize),
}

/// Little-endian cursor over a received datagram.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(DecodeError::Truncated { wanted: n, remaining });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn ipaddr(&mut self) -> Result<Ipv6Addr, DecodeError> {
        let b = self.take(16)?;
        let mut octets = [0u8; 16];
        octets.copy_from_slice(b);
        Ok(Ipv6Addr::from(octets))
    }

    fn finish(self) -> Result<(), DecodeError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

/// A mapping request, root to node: the epoch the node shall answer for.
///
/// Layout: `instance_id (1) | dag_id (2) | dag_version (1) | timestamp (1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingRequest {
    /// The RPL instance being mapped.
    pub instance_id: u8,
    /// The compressed DODAG identifier being mapped.
    pub dag_id: u16,
    /// The DODAG version the root currently sees.
    pub dag_version: u8,
    /// The round timestamp; the reply must echo it.
    pub timestamp: u8,
}

impl MappingRequest {
    /// Encoded size in bytes.
    pub const SIZE: usize = 5;

    /// Serialize into the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.push(self.instance_id);
        out.extend_from_slice(&self.dag_id.to_le_bytes());
        out.push(self.dag_version);
        out.push(self.timestamp);
        out
    }

    /// Parse from the wire layout.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let out = Self {
            instance_id: r.u8()?,
            dag_id: r.u16()?,
            dag_version: r.u8()?,
            timestamp: r.u8()?,
        };
        r.finish()?;
        Ok(out)
    }
}

/// One neighbor observation inside a mapping reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborReport {
    /// Short identifier of the neighbor.
    pub id: u16,
    /// The rank the reporting node believes this neighbor has.
    pub rank: u16,
}

/// A mapping reply, node to root: the node's view of its DODAG surroundings.
///
/// Layout: `src (2) | instance_id (1) | dag_id (2) | dag_version (1) | timestamp (1) | rank (2) |
/// parent (2) | n_neighbors (2)` followed by `id (2) | rank (2)` per neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingReply {
    /// Short identifier the sender claims for itself.
    pub src: u16,
    /// Echo of the request's instance.
    pub instance_id: u8,
    /// Echo of the request's compressed DODAG identifier.
    pub dag_id: u16,
    /// Echo of the request's DODAG version.
    pub dag_version: u8,
    /// Echo of the request's round timestamp.
    pub timestamp: u8,
    /// The rank the sender claims for itself.
    pub rank: u16,
    /// Short identifier of the sender's preferred parent.
    pub parent: u16,
    /// The sender's neighbor observations.
    pub neighbors: Vec<NeighborReport>,
}

impl MappingReply {
    /// Serialize into the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(13 + 4 * self.neighbors.len());
        out.extend_from_slice(&self.src.to_le_bytes());
        out.push(self.instance_id);
        out.extend_from_slice(&self.dag_id.to_le_bytes());
        out.push(self.dag_version);
        out.push(self.timestamp);
        out.extend_from_slice(&self.rank.to_le_bytes());
        out.extend_from_slice(&self.parent.to_le_bytes());
        out.extend_from_slice(&(self.neighbors.len() as u16).to_le_bytes());
        for neighbor in &self.neighbors {
            out.extend_from_slice(&neighbor.id.to_le_bytes());
            out.extend_from_slice(&neighbor.rank.to_le_bytes());
        }
        out
    }

    /// Parse from the wire layout. The claimed neighbor count must match the buffer length.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let src = r.u16()?;
        let instance_id = r.u8()?;
        let dag_id = r.u16()?;
        let dag_version = r.u8()?;
        let timestamp = r.u8()?;
        let rank = r.u16()?;
        let parent = r.u16()?;
        let n_neighbors = r.u16()?;
        let mut neighbors = Vec::new();
        for _ in 0..n_neighbors {
            neighbors.push(NeighborReport { id: r.u16()?, rank: r.u16()? });
        }
        r.finish()?;
        Ok(Self { src, instance_id, dag_id, dag_version, timestamp, rank, parent, neighbors })
    }
}

/// A filter-install request, node to root.
///
/// Layout: `dest (2) | src (16)`. The destination is the compressed address of the requesting
/// sensor; the source is the full address of the abusive external host, which cannot be compressed
/// since it may lie anywhere in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterRequest {
    /// Short identifier of the sensor asking for protection.
    pub dest: u16,
    /// Address of the abusive external host.
    pub src: Ipv6Addr,
}

impl FilterRequest {
    /// Encoded size in bytes.
    pub const SIZE: usize = 18;

    /// Serialize into the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.dest.to_le_bytes());
        out.extend_from_slice(&self.src.octets());
        out
    }

    /// Parse from the wire layout.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let out = Self { dest: r.u16()?, src: r.ipaddr()? };
        r.finish()?;
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_layout_is_five_little_endian_bytes() {
        let req = MappingRequest { instance_id: 1, dag_id: 0x0001, dag_version: 1, timestamp: 1 };
        assert_eq!(req.encode(), vec![0x01, 0x01, 0x00, 0x01, 0x01]);
        assert_eq!(MappingRequest::decode(&req.encode()), Ok(req));
    }

    #[test]
    fn reply_layout_matches_the_documented_fields() {
        let bytes = [
            0x02, 0x00, // src 0x0002
            0x01, // instance
            0x01, 0x00, // dag 0x0001
            0x01, // version
            0x01, // timestamp
            0x00, 0x02, // rank 512
            0x01, 0x00, // parent 0x0001
            0x01, 0x00, // one neighbor
            0x01, 0x00, 0x00, 0x01, // neighbor 0x0001 with rank 256
        ];
        let reply = MappingReply::decode(&bytes).unwrap();
        assert_eq!(reply.src, 0x0002);
        assert_eq!(reply.rank, 512);
        assert_eq!(reply.parent, 0x0001);
        assert_eq!(reply.neighbors, vec![NeighborReport { id: 0x0001, rank: 256 }]);
        assert_eq!(reply.encode(), bytes.to_vec());
    }

    #[test]
    fn truncated_and_padded_packets_are_rejected() {
        assert_eq!(
            MappingRequest::decode(&[0x01, 0x01, 0x00, 0x01]),
            Err(DecodeError::Truncated { wanted: 1, remaining: 0 })
        );
        assert_eq!(
            MappingRequest::decode(&[0x01, 0x01, 0x00, 0x01, 0x01, 0xff]),
            Err(DecodeError::TrailingBytes(1))
        );
        // a reply claiming more neighbors than it carries
        let mut bytes = MappingReply {
            src: 2,
            instance_id: 1,
            dag_id: 1,
            dag_version: 1,
            timestamp: 1,
            rank: 512,
            parent: 1,
            neighbors: vec![],
        }
        .encode();
        bytes[11] = 3; // n_neighbors = 3, but none follow
        assert!(matches!(MappingReply::decode(&bytes), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn filter_request_carries_the_full_source_address() {
        let req = FilterRequest { dest: 0x0002, src: "2001::dead".parse().unwrap() };
        let bytes = req.encode();
        assert_eq!(bytes.len(), FilterRequest::SIZE);
        assert_eq!(&bytes[..2], &[0x02, 0x00]);
        assert_eq!(bytes[2], 0x20);
        assert_eq!(FilterRequest::decode(&bytes), Ok(req));
    }
}
