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

use std::{net::TcpStream, sync::Arc};

use async_trait::async_trait;
use darkfi_serial::{Decodable, Encodable};
use futures::{AsyncReadExt, AsyncWriteExt, FutureExt};
use log::debug;
use smol::Async;
use url::Url;

use super::{entry::HostSettings, pool::ContractRequest};
use crate::{
    chain::Transaction,
    settings::SettingsPtr,
    system::sleep,
    Error, Result,
};

/// RPC code requesting the host's advertised settings.
pub const RPC_SETTINGS: u8 = 0x01;

/// RPC code opening a contract negotiation.
pub const RPC_CONTRACT: u8 = 0x02;

/// Frame prefix on every host RPC response.
const MAGIC_BYTES: [u8; 4] = [0x73, 0x74, 0x6f, 0x72];

/// Largest response frame a host may send us.
const MAX_FRAME_SIZE: u32 = 1 << 20;

pub type HostDialerPtr = Arc<dyn HostDialer>;

/// Outbound connections to hosts. The scanner and the contract
/// negotiator only ever talk to hosts through this trait, so tests
/// substitute a fake without touching the network.
#[async_trait]
pub trait HostDialer: Send + Sync {
    /// Dial the host and fetch its currently advertised settings.
    async fn request_settings(&self, addr: &Url) -> Result<HostSettings>;

    /// Dial the host and run one contract negotiation, returning the
    /// fully signed transaction set.
    async fn negotiate_contract(&self, addr: &Url, request: &ContractRequest)
        -> Result<Vec<Transaction>>;
}

/// The production dialer: plain TCP with the configured connect
/// timeout and read deadline.
pub struct TcpHostDialer {
    settings: SettingsPtr,
}

impl TcpHostDialer {
    pub fn new(settings: SettingsPtr) -> Arc<Self> {
        Arc::new(Self { settings })
    }

    async fn connect(&self, addr: &Url) -> Result<Async<TcpStream>> {
        let sockaddr = addr
            .socket_addrs(|| None)
            .map_err(|_| Error::UrlParse(addr.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UrlParse(addr.to_string()))?;

        futures::select! {
            stream = Async::<TcpStream>::connect(sockaddr).fuse() => {
                match stream {
                    Ok(stream) => Ok(stream),
                    Err(_) => Err(Error::ConnectFailed),
                }
            }
            _ = sleep(self.settings.connect_timeout_seconds).fuse() => Err(Error::ConnectTimeout),
        }
    }

    /// Read one `magic || len || payload` response frame within the
    /// read deadline.
    async fn read_frame(&self, stream: &mut Async<TcpStream>) -> Result<Vec<u8>> {
        let deadline = self.settings.read_timeout_seconds;
        futures::select! {
            frame = read_frame_inner(stream).fuse() => frame,
            _ = sleep(deadline).fuse() => Err(Error::ChannelTimeout),
        }
    }

    async fn request(&self, addr: &Url, rpc: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = self.connect(addr).await?;

        let mut request = vec![rpc];
        request.extend_from_slice(payload);
        stream.write_all(&request).await?;

        let response = self.read_frame(&mut stream).await?;
        stream.close().await?;
        Ok(response)
    }
}

async fn read_frame_inner(stream: &mut Async<TcpStream>) -> Result<Vec<u8>> {
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic).await?;
    if magic != MAGIC_BYTES {
        debug!(target: "hostdb::dial", "Received malformed magic bytes {:?}", magic);
        return Err(Error::ParseFailed("bad response magic"))
    }

    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await?;
    let len = u32::from_le_bytes(len);
    if len > MAX_FRAME_SIZE {
        return Err(Error::ParseFailed("oversized response frame"))
    }

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

#[async_trait]
impl HostDialer for TcpHostDialer {
    async fn request_settings(&self, addr: &Url) -> Result<HostSettings> {
        debug!(target: "hostdb::dial", "Requesting settings from {}", addr);

        let response = self.request(addr, RPC_SETTINGS, &[]).await?;
        let settings = HostSettings::decode(&mut &response[..])
            .map_err(|_| Error::ParseFailed("malformed host settings"))?;
        Ok(settings)
    }

    async fn negotiate_contract(
        &self,
        addr: &Url,
        request: &ContractRequest,
    ) -> Result<Vec<Transaction>> {
        debug!(target: "hostdb::dial", "Negotiating contract with {}", addr);

        let mut payload = vec![];
        request
            .encode(&mut payload)
            .map_err(|_| Error::ContractNegotiation("unencodable request".to_string()))?;

        let response = self.request(addr, RPC_CONTRACT, &payload).await?;
        let txns = Vec::<Transaction>::decode(&mut &response[..])
            .map_err(|_| Error::ContractNegotiation("malformed host response".to_string()))?;
        Ok(txns)
    }
}
