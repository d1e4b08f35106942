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

//! The smallest view of the blockchain the host database needs.
//!
//! The consensus set, wallet and transaction pool are full modules of
//! their own; the host layer consumes them only through the narrow
//! capability traits below, which also makes them trivial to mock in
//! tests.

use std::{fmt, io, str::FromStr, sync::Arc};

use async_trait::async_trait;
use darkfi_serial::{Decodable, Encodable, ReadExt, SerialDecodable, SerialEncodable, WriteExt};
use sha2::{Digest, Sha256};

use crate::Result;

/// Chain height, measured in blocks
pub type BlockHeight = u64;

/// An amount of base currency units
pub type Currency = u128;

/// A 32-byte hash (block ids, contract ids, Merkle roots, addresses)
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Hash arbitrary bytes into a `Hash`.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Hash the canonical encoding of any encodable object.
    pub fn of<T: Encodable>(object: &T) -> Self {
        let mut data = vec![];
        // Encoding to a Vec cannot fail.
        object.encode(&mut data).expect("encode to Vec");
        Self::digest(&data)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Hash {
    type Err = crate::Error;

    fn from_str(encoded: &str) -> Result<Self> {
        let decoded = hex::decode(encoded)
            .map_err(|_| crate::Error::InvalidEncoding("bad hex hash"))?;
        let bytes: [u8; 32] =
            decoded.try_into().map_err(|_| crate::Error::InvalidEncoding("bad hash length"))?;
        Ok(Self(bytes))
    }
}

impl Encodable for Hash {
    fn encode<S: io::Write>(&self, s: &mut S) -> io::Result<usize> {
        s.write_slice(&self.0)?;
        Ok(32)
    }
}

impl Decodable for Hash {
    fn decode<D: io::Read>(d: &mut D) -> io::Result<Self> {
        let mut bytes = [0u8; 32];
        d.read_slice(&mut bytes)?;
        Ok(Self(bytes))
    }
}

impl serde::Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> serde::Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_str(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Conditions under which a payout can be spent.
#[derive(
    Clone, Default, PartialEq, Eq, Debug, SerialEncodable, SerialDecodable, serde::Serialize,
    serde::Deserialize,
)]
pub struct UnlockConditions {
    pub timelock: BlockHeight,
    pub required_signatures: u64,
    pub unlock_hash: Hash,
}

/// A currency output paid to an unlock hash.
#[derive(
    Clone, PartialEq, Eq, Debug, SerialEncodable, SerialDecodable, serde::Serialize,
    serde::Deserialize,
)]
pub struct CurrencyOutput {
    pub value: Currency,
    pub unlock_hash: Hash,
}

/// An agreement to store data, enforced by the chain: the host must
/// prove storage within the proof window or the missed outputs pay out
/// instead of the valid ones.
#[derive(
    Clone, PartialEq, Eq, Debug, SerialEncodable, SerialDecodable, serde::Serialize,
    serde::Deserialize,
)]
pub struct FileContract {
    pub file_size: u64,
    pub file_merkle_root: Hash,
    pub window_start: BlockHeight,
    pub window_end: BlockHeight,
    pub payout: Currency,
    pub valid_proof_outputs: Vec<CurrencyOutput>,
    pub missed_proof_outputs: Vec<CurrencyOutput>,
    pub unlock_hash: Hash,
}

impl FileContract {
    /// The contract's chain identifier.
    pub fn id(&self) -> Hash {
        Hash::of(self)
    }
}

/// The payment-channel state of a file contract. Each revision
/// supersedes the previous one by revision number.
#[derive(
    Clone, PartialEq, Eq, Debug, SerialEncodable, SerialDecodable, serde::Serialize,
    serde::Deserialize,
)]
pub struct FileContractRevision {
    pub parent_id: Hash,
    pub unlock_conditions: UnlockConditions,
    pub new_revision_number: u64,
    pub new_file_size: u64,
    pub new_file_merkle_root: Hash,
    pub new_window_start: BlockHeight,
    pub new_window_end: BlockHeight,
    pub new_valid_proof_outputs: Vec<CurrencyOutput>,
    pub new_missed_proof_outputs: Vec<CurrencyOutput>,
    pub new_unlock_hash: Hash,
}

/// A transaction, reduced to the parts the host layer inspects.
#[derive(
    Clone, Default, PartialEq, Eq, Debug, SerialEncodable, SerialDecodable, serde::Serialize,
    serde::Deserialize,
)]
pub struct Transaction {
    pub arbitrary_data: Vec<Vec<u8>>,
    pub file_contracts: Vec<FileContract>,
    pub file_contract_revisions: Vec<FileContractRevision>,
}

/// A block, reduced to its id and transactions. Heights are tracked by
/// the consumer as changes apply and revert.
#[derive(Clone, Default, Debug)]
pub struct Block {
    pub id: Hash,
    pub transactions: Vec<Transaction>,
}

/// One unit of consensus reorganization: blocks rolled back, then
/// blocks moved forward.
#[derive(Clone, Default, Debug)]
pub struct ConsensusChange {
    pub reverted: Vec<Block>,
    pub applied: Vec<Block>,
}

pub type ConsensusSubscriberPtr = Arc<dyn ConsensusSubscriber>;

/// Receiver of consensus changes. Changes are delivered synchronously
/// and in order.
#[async_trait]
pub trait ConsensusSubscriber: Send + Sync {
    async fn process_consensus_change(&self, change: ConsensusChange);
}

/// The consensus set, consumed only as a source of change events.
#[async_trait]
pub trait ConsensusSet: Send + Sync {
    async fn subscribe(&self, subscriber: ConsensusSubscriberPtr) -> Result<()>;
}

/// An in-progress transaction being assembled by the wallet.
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    /// Append an arbitrary-data payload, returning its index.
    fn add_arbitrary_data(&mut self, data: Vec<u8>) -> u64;

    /// Append a file contract, returning its index.
    fn add_file_contract(&mut self, contract: FileContract) -> u64;

    /// Add inputs (and a refund output) covering `amount`.
    async fn fund(&mut self, amount: Currency) -> Result<()>;

    /// Sign the transaction. `whole` asks for a signature covering the
    /// entire transaction rather than individual parts.
    async fn sign(&mut self, whole: bool) -> Result<Vec<Transaction>>;

    /// The transaction in its current state, along with its parents.
    fn view(&self) -> (Transaction, Vec<Transaction>);

    /// Abandon the transaction, releasing any funds it reserved.
    fn drop_builder(&mut self);
}

/// The slice of the wallet the host layer needs.
#[async_trait]
pub trait Wallet: Send + Sync {
    async fn next_address(&self) -> Result<UnlockConditions>;
    async fn start_transaction(&self) -> Box<dyn TransactionBuilder>;
}

/// The transaction pool, consumed only as a submission sink.
#[async_trait]
pub trait TransactionPool: Send + Sync {
    async fn accept_transaction_set(&self, txns: Vec<Transaction>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_id_distinct() {
        let contract = FileContract {
            file_size: 100,
            file_merkle_root: Hash::default(),
            window_start: 10,
            window_end: 20,
            payout: 1000,
            valid_proof_outputs: vec![CurrencyOutput { value: 1000, unlock_hash: Hash::default() }],
            missed_proof_outputs: vec![CurrencyOutput { value: 1000, unlock_hash: Hash::default() }],
            unlock_hash: Hash::default(),
        };

        let mut other = contract.clone();
        other.window_end = 21;

        assert_eq!(contract.id(), contract.clone().id());
        assert_ne!(contract.id(), other.id());
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let h = Hash::digest(b"some data");
        let parsed: Hash = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
        assert!(Hash::from_str("zz").is_err());
    }
}
