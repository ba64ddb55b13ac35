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

//! Module containing all error types

use crate::firewall::RequestDrop;
use crate::mapper::ReplyDrop;
use crate::wire::DecodeError;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A packet did not parse as one of the fixed wire layouts.
    #[error("Wire format error: {0}")]
    Decode(#[from] DecodeError),
    /// A mapping reply was dropped. All drop reasons recover locally; the next round re-queries
    /// every node.
    #[error("Mapping reply dropped: {0}")]
    ReplyDrop(#[from] ReplyDrop),
    /// A filter-install request was dropped.
    #[error("Filter request dropped: {0}")]
    RequestDrop(#[from] RequestDrop),
}
