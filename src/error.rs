/* This file is part of Stornet (https://stornet.network)
 *
 * Copyright (C) 2024-2026 Stornet developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("io error: {0:?}")]
    Io(std::io::ErrorKind),

    #[error("Parse failed: {0}")]
    ParseFailed(&'static str),

    #[error("Unable to parse URL: {0}")]
    UrlParse(String),

    #[error("Connection failed")]
    ConnectFailed,

    #[error("Connection timed out")]
    ConnectTimeout,

    #[error("Channel timed out")]
    ChannelTimeout,

    #[error("Channel stopped")]
    ChannelStopped,

    #[error("Service stopped")]
    ServiceStopped,

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(&'static str),

    #[error("Signature did not verify")]
    VerifyFailed,

    #[error("No hosts eligible for selection")]
    NoHosts,

    #[error("Host scan failed: {0}")]
    ScanFailed(String),

    #[error("Host not found in database")]
    HostNotFound,

    #[error("Contract not found in database")]
    ContractNotFound,

    #[error("Contract negotiation failed: {0}")]
    ContractNegotiation(String),

    #[error("Corrupt persisted state: {0}")]
    CorruptPersistence(String),

    #[error("JSON serialization error: {0}")]
    SerdeJson(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.kind())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerdeJson(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::UrlParse(err.to_string())
    }
}

impl<T> From<smol::channel::SendError<T>> for Error {
    fn from(_err: smol::channel::SendError<T>) -> Self {
        Self::ChannelStopped
    }
}

impl From<smol::channel::RecvError> for Error {
    fn from(_err: smol::channel::RecvError) -> Self {
        Self::ChannelStopped
    }
}
