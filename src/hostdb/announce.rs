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

use std::io;

use darkfi_serial::{Decodable, Encodable, ReadExt, WriteExt};
use url::Url;

use crate::{
    crypto::{PublicKey, SecretKey, Signature},
    Error, Result,
};

/// Tag opening every host announcement payload.
pub const ANNOUNCEMENT_TAG: [u8; 16] = *b"HostAnnouncement";

/// A host's on-chain advertisement of its network address, carried as
/// an arbitrary-data payload:
/// `tag || address (VarInt-prefixed UTF-8) || pubkey (65) || sig (64)`.
/// The signature covers `tag || address` under the embedded key.
#[derive(Clone, Debug)]
pub struct HostAnnouncement {
    pub address: Url,
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl HostAnnouncement {
    /// Build a signed announcement for the given address.
    pub fn new(address: Url, secret: &SecretKey) -> Self {
        let signature = secret.sign(&signed_payload(&address));
        Self { address, public_key: secret.public_key(), signature }
    }

    /// Check the embedded signature against the embedded key.
    pub fn verify(&self) -> Result<()> {
        self.public_key.verify(&signed_payload(&self.address), &self.signature)
    }
}

/// The bytes the announcement signature commits to.
fn signed_payload(address: &Url) -> Vec<u8> {
    let mut payload = ANNOUNCEMENT_TAG.to_vec();
    payload.extend_from_slice(address.as_str().as_bytes());
    payload
}

impl Encodable for HostAnnouncement {
    fn encode<S: io::Write>(&self, mut s: &mut S) -> io::Result<usize> {
        let mut len = ANNOUNCEMENT_TAG.len();
        s.write_slice(&ANNOUNCEMENT_TAG)?;
        len += self.address.as_str().to_string().encode(&mut s)?;
        len += self.public_key.encode(&mut s)?;
        len += self.signature.encode(&mut s)?;
        Ok(len)
    }
}

impl Decodable for HostAnnouncement {
    fn decode<D: io::Read>(mut d: &mut D) -> io::Result<Self> {
        let mut tag = [0u8; 16];
        d.read_slice(&mut tag)?;
        if tag != ANNOUNCEMENT_TAG {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad announcement tag"))
        }

        let address: String = Decodable::decode(&mut d)?;
        let address = Url::parse(&address)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad announcement address"))?;

        Ok(Self {
            address,
            public_key: Decodable::decode(&mut d)?,
            signature: Decodable::decode(&mut d)?,
        })
    }
}

/// Serialize a signed announcement, ready for `add_arbitrary_data`.
pub fn create_announcement(address: &Url, secret: &SecretKey) -> Vec<u8> {
    let announcement = HostAnnouncement::new(address.clone(), secret);
    let mut data = vec![];
    // Encoding to a Vec cannot fail.
    announcement.encode(&mut data).expect("encode to Vec");
    data
}

/// Decode an arbitrary-data payload as a host announcement and verify
/// its signature. Anything that does not parse and verify is rejected.
pub fn decode_announcement(data: &[u8]) -> Result<HostAnnouncement> {
    let announcement = HostAnnouncement::decode(&mut &data[..])
        .map_err(|_| Error::InvalidEncoding("undecodable announcement"))?;
    announcement.verify()?;
    Ok(announcement)
}
