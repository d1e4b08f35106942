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

use std::sync::Arc;

use async_trait::async_trait;
use darkfi_serial::{serialize, SerialDecodable, SerialEncodable};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{entry::HostSettings, store::{HostDb, HostDbPtr}};
use crate::{
    chain::{
        BlockHeight, Currency, CurrencyOutput, FileContract, FileContractRevision, Hash,
        Transaction, TransactionBuilder, UnlockConditions, Wallet,
    },
    crypto::{SecretKey, Signature},
    Error, Result,
};

/// How many weighted-random candidates one pool pulls per attempt.
const POOL_CANDIDATES: usize = 10;

/// An active file contract with one host, together with everything
/// needed to revise it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostContract {
    /// The host the contract is with
    pub ip: Url,
    pub id: Hash,
    pub file_contract: FileContract,
    pub last_revision: FileContractRevision,
    pub last_revision_txn: Transaction,
    /// Key revisions of this contract are signed with
    pub secret_key: SecretKey,
}

/// What the renter sends a host to open a negotiation: the funded and
/// renter-signed transaction set, plus the initial revision and its
/// signature.
#[derive(Clone, Debug, SerialEncodable, SerialDecodable)]
pub struct ContractRequest {
    pub transactions: Vec<Transaction>,
    pub revision: FileContractRevision,
    pub signature: Signature,
}

/// A set of contracts formed for storing one file. Negotiates with a
/// sequence of weighted-random hosts until the requested size is
/// covered for the requested duration.
pub struct HostPool {
    db: HostDbPtr,
    filesize: u64,
    duration: BlockHeight,
    hosts: Vec<Url>,
    contracts: Vec<Hash>,
}

impl HostPool {
    pub fn hosts(&self) -> &[Url] {
        &self.hosts
    }

    pub fn contracts(&self) -> &[Hash] {
        &self.contracts
    }

    /// Negotiate contracts with up to `n` additional distinct hosts,
    /// for callers wanting redundancy beyond the initial coverage.
    /// Returns how many hosts were added.
    pub async fn add_hosts(&mut self, n: usize) -> usize {
        let end_height = self.db.block_height().await + self.duration;
        let candidates = self.db.random_hosts(n + self.hosts.len()).await;

        let mut added = 0;
        for candidate in candidates {
            if added == n {
                break
            }
            if self.hosts.contains(candidate.address()) {
                continue
            }
            if candidate.settings.max_duration < self.duration {
                continue
            }

            match self
                .db
                .form_contract(&candidate.settings, self.filesize, end_height, Hash::default())
                .await
            {
                Ok(contract) => {
                    let id = contract.id;
                    self.db.adopt_contract(contract).await;
                    self.hosts.push(candidate.settings.address.clone());
                    self.contracts.push(id);
                    added += 1;
                }
                Err(e) => {
                    debug!(
                        target: "hostdb::pool::add_hosts()",
                        "Negotiation with {} failed: {}", candidate.address(), e,
                    );
                }
            }
        }
        added
    }
}

impl HostDb {
    /// Form contracts covering `filesize` bytes for `duration` blocks
    /// with weighted-random hosts. Fails with `NoHosts` if no
    /// candidate negotiation succeeds.
    pub async fn new_pool(self: &Arc<Self>, filesize: u64, duration: BlockHeight) -> Result<HostPool> {
        let end_height = self.block_height().await + duration;
        let candidates = self.random_hosts(POOL_CANDIDATES).await;

        let mut pool = HostPool {
            db: self.clone(),
            filesize,
            duration,
            hosts: vec![],
            contracts: vec![],
        };
        let mut covered = 0u64;

        for candidate in candidates {
            if !pool.contracts.is_empty() && covered >= filesize {
                break
            }
            if candidate.settings.max_duration < duration {
                debug!(
                    target: "hostdb::pool::new_pool()",
                    "Skipping {}: max duration too short", candidate.address(),
                );
                continue
            }

            match self.form_contract(&candidate.settings, filesize, end_height, Hash::default()).await
            {
                Ok(contract) => {
                    let id = contract.id;
                    self.adopt_contract(contract).await;
                    pool.hosts.push(candidate.settings.address.clone());
                    pool.contracts.push(id);
                    covered = covered.saturating_add(filesize);
                }
                Err(e) => {
                    debug!(
                        target: "hostdb::pool::new_pool()",
                        "Negotiation with {} failed: {}", candidate.address(), e,
                    );
                }
            }
        }

        if pool.contracts.is_empty() {
            warn!(target: "hostdb::pool::new_pool()", "No host accepted a contract");
            return Err(Error::NoHosts)
        }

        Ok(pool)
    }

    /// Renew an existing contract with the same host, reusing the file
    /// Merkle root, and atomically swap the bookkeeping entry. Returns
    /// the new contract id.
    pub async fn renew(&self, id: Hash, new_end_height: BlockHeight) -> Result<Hash> {
        let (old, host) = {
            let inner = self.inner.read().await;
            let old = inner.contracts.get(&id).ok_or(Error::ContractNotFound)?.clone();
            let host =
                inner.hosts.get(&old.ip).ok_or(Error::HostNotFound)?.settings.clone();
            (old, host)
        };

        let new_contract = self
            .form_contract(
                &host,
                old.last_revision.new_file_size,
                new_end_height,
                old.last_revision.new_file_merkle_root,
            )
            .await?;
        let new_id = new_contract.id;

        {
            let mut inner = self.inner.write().await;
            inner.contracts.remove(&id);
            inner.contracts.insert(new_id, new_contract);
        }
        self.store_subscriber.notify(()).await;

        debug!(target: "hostdb::pool::renew()", "Renewed contract {} as {}", id, new_id);
        Ok(new_id)
    }

    /// Ids of all active contracts.
    pub async fn contract_ids(&self) -> Vec<Hash> {
        self.inner.read().await.contracts.keys().copied().collect()
    }

    /// Negotiate one contract with one host: build and fund the
    /// contract transaction, sign the initial revision, run the
    /// negotiation RPC, and submit the host-signed set to the pool.
    /// No lock is held during wallet, network or pool calls.
    pub(super) async fn form_contract(
        &self,
        host: &HostSettings,
        filesize: u64,
        end_height: BlockHeight,
        file_merkle_root: Hash,
    ) -> Result<HostContract> {
        let height = self.block_height().await;
        if end_height <= height {
            return Err(Error::ContractNegotiation("contract would end in the past".to_string()))
        }

        let client_address = self.contract_address().await?;
        let contract_key = SecretKey::random();

        let blocks = (end_height - height) as Currency;
        let payout = host.price.saturating_mul(filesize as Currency).saturating_mul(blocks);

        let file_contract = FileContract {
            file_size: filesize,
            file_merkle_root,
            window_start: end_height,
            window_end: end_height + host.window_size,
            payout,
            valid_proof_outputs: vec![CurrencyOutput {
                value: payout,
                unlock_hash: client_address.unlock_hash,
            }],
            missed_proof_outputs: vec![CurrencyOutput {
                value: payout,
                unlock_hash: client_address.unlock_hash,
            }],
            unlock_hash: client_address.unlock_hash,
        };

        let mut builder = self.wallet.start_transaction().await;
        builder.add_file_contract(file_contract.clone());
        if let Err(e) = builder.fund(payout).await {
            builder.drop_builder();
            return Err(Error::ContractNegotiation(format!("funding failed: {}", e)))
        }

        // The contract id is taken from the transaction as built, so a
        // wallet rewriting the contract would be caught here.
        let (txn, _parents) = builder.view();
        let Some(id) = txn.file_contracts.last().map(|fc| fc.id()) else {
            builder.drop_builder();
            return Err(Error::ContractNegotiation("builder lost the contract".to_string()))
        };

        let revision = FileContractRevision {
            parent_id: id,
            unlock_conditions: client_address.clone(),
            new_revision_number: 1,
            new_file_size: file_contract.file_size,
            new_file_merkle_root: file_contract.file_merkle_root,
            new_window_start: file_contract.window_start,
            new_window_end: file_contract.window_end,
            new_valid_proof_outputs: file_contract.valid_proof_outputs.clone(),
            new_missed_proof_outputs: file_contract.missed_proof_outputs.clone(),
            new_unlock_hash: file_contract.unlock_hash,
        };
        let signature = contract_key.sign(&serialize(&revision));

        let signed = match builder.sign(true).await {
            Ok(signed) => signed,
            Err(e) => {
                builder.drop_builder();
                return Err(Error::ContractNegotiation(format!("signing failed: {}", e)))
            }
        };

        let request =
            ContractRequest { transactions: signed, revision: revision.clone(), signature };
        let final_set = match self.dialer.negotiate_contract(&host.address, &request).await {
            Ok(set) => set,
            Err(e) => {
                builder.drop_builder();
                return Err(Error::ContractNegotiation(format!(
                    "host {} refused: {}",
                    host.address, e
                )))
            }
        };

        self.tpool
            .accept_transaction_set(final_set)
            .await
            .map_err(|e| Error::ContractNegotiation(format!("pool rejected set: {}", e)))?;

        let last_revision_txn = Transaction {
            file_contract_revisions: vec![revision.clone()],
            ..Default::default()
        };

        debug!(
            target: "hostdb::pool::form_contract()",
            "Formed contract {} with {}", id, host.address,
        );

        Ok(HostContract {
            ip: host.address.clone(),
            id,
            file_contract,
            last_revision: revision,
            last_revision_txn,
            secret_key: contract_key,
        })
    }

    pub(super) async fn adopt_contract(&self, contract: HostContract) {
        self.inner.write().await.contracts.insert(contract.id, contract);
        self.store_subscriber.notify(()).await;
    }

    /// The wallet address contracts pay out to, allocated once and
    /// reused.
    async fn contract_address(&self) -> Result<UnlockConditions> {
        if let Some(address) = self.inner.read().await.cached_address.clone() {
            return Ok(address)
        }

        let address = self.wallet.next_address().await?;
        self.inner.write().await.cached_address = Some(address.clone());
        Ok(address)
    }
}

/// The wallet module's own interface, whose transaction builder type
/// carries more surface than the host layer needs.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    type Builder: TransactionBuilder + 'static;

    async fn next_address(&self) -> Result<UnlockConditions>;
    async fn start_transaction(&self) -> Self::Builder;
}

/// Adapter from a full wallet to the narrow [`Wallet`] trait, so
/// neither interface needs widening.
pub struct WalletShim<W: WalletBackend> {
    wallet: Arc<W>,
}

impl<W: WalletBackend> WalletShim<W> {
    pub fn new(wallet: Arc<W>) -> Arc<Self> {
        Arc::new(Self { wallet })
    }
}

#[async_trait]
impl<W: WalletBackend + 'static> Wallet for WalletShim<W> {
    async fn next_address(&self) -> Result<UnlockConditions> {
        self.wallet.next_address().await
    }

    async fn start_transaction(&self) -> Box<dyn TransactionBuilder> {
        Box::new(self.wallet.start_transaction().await)
    }
}
