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
use k256::{
    elliptic_curve::{ops::Reduce, Field, PrimeField},
    ProjectivePoint, Scalar, U256,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::keypair::{PublicKey, SecretKey};
use crate::{Error, Result};

/// Number of bytes in a challenge hash or response scalar
pub const SIGNATURE_PART_SIZE: usize = 32;

/// An EC-Schnorr signature: the challenge hash `e` and the response
/// scalar `s`, 64 bytes on the wire as `e || s`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Signature {
    challenge: [u8; SIGNATURE_PART_SIZE],
    response: Scalar,
}

impl SecretKey {
    /// Sign a message. The commitment nonce is sampled fresh from the
    /// OS RNG for every signature; reusing a nonce across two messages
    /// leaks the secret key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let mask = Scalar::random(&mut OsRng);
        let commit = PublicKey(ProjectivePoint::GENERATOR * mask);

        let challenge = hash_challenge(message, &commit);
        let e = <Scalar as Reduce<U256>>::reduce_bytes(&challenge.into());

        // s = k - e*r
        let response = mask - e * self.inner();

        Signature { challenge, response }
    }
}

impl PublicKey {
    /// Verify a signature by reconstructing the commitment `sG + eP`
    /// and recomputing the challenge. The final comparison is constant
    /// time.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let e = <Scalar as Reduce<U256>>::reduce_bytes(&signature.challenge.into());
        let commit =
            PublicKey(ProjectivePoint::GENERATOR * signature.response + self.0 * e);

        let challenge = hash_challenge(message, &commit);
        if challenge[..].ct_eq(&signature.challenge[..]).into() {
            Ok(())
        } else {
            Err(Error::VerifyFailed)
        }
    }
}

/// `e = H(message || K)` with K in uncompressed form.
fn hash_challenge(message: &[u8], commit: &PublicKey) -> [u8; SIGNATURE_PART_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(message);
    hasher.update(commit.serialize());
    hasher.finalize().into()
}

impl Signature {
    pub fn serialize(&self) -> [u8; 2 * SIGNATURE_PART_SIZE] {
        let mut data = [0u8; 2 * SIGNATURE_PART_SIZE];
        data[..SIGNATURE_PART_SIZE].copy_from_slice(&self.challenge);
        let response: [u8; 32] = self.response.to_repr().into();
        data[SIGNATURE_PART_SIZE..].copy_from_slice(&response);
        data
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() != 2 * SIGNATURE_PART_SIZE {
            return Err(Error::InvalidEncoding("bad signature length"))
        }

        let mut challenge = [0u8; SIGNATURE_PART_SIZE];
        challenge.copy_from_slice(&data[..SIGNATURE_PART_SIZE]);

        let mut response = [0u8; SIGNATURE_PART_SIZE];
        response.copy_from_slice(&data[SIGNATURE_PART_SIZE..]);

        Ok(Self {
            challenge,
            response: <Scalar as Reduce<U256>>::reduce_bytes(&response.into()),
        })
    }
}

impl Encodable for Signature {
    fn encode<S: io::Write>(&self, s: &mut S) -> io::Result<usize> {
        s.write_slice(&self.serialize())?;
        Ok(2 * SIGNATURE_PART_SIZE)
    }
}

impl Decodable for Signature {
    fn decode<D: io::Read>(d: &mut D) -> io::Result<Self> {
        let mut data = [0u8; 2 * SIGNATURE_PART_SIZE];
        d.read_slice(&mut data)?;
        Self::deserialize(&data)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad signature"))
    }
}
