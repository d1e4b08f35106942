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

use std::{fmt, io, str::FromStr};

use darkfi_serial::{Decodable, Encodable, ReadExt, WriteExt};
use k256::{
    elliptic_curve::{
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field, PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar, U256,
};
use rand::rngs::OsRng;

use crate::{Error, Result};

/// Number of bytes in one coordinate of a secp256k1 point
pub const COORDINATE_SIZE: usize = 32;

/// Header byte of a compressed point selecting the even Y coordinate
pub const HEADER_COMPRESSED_EVEN: u8 = 0x02;

/// Header byte of a compressed point selecting the odd Y coordinate
pub const HEADER_COMPRESSED_ODD: u8 = 0x03;

/// Header byte of an uncompressed point
pub const HEADER_UNCOMPRESSED: u8 = 0x04;

/// Header byte of a serialized secret key
pub const HEADER_SECRET: u8 = 0x08;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Keypair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl Keypair {
    pub fn new(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn random() -> Self {
        Self::new(SecretKey::random())
    }
}

/// A secret scalar on the secp256k1 curve.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SecretKey(Scalar);

impl SecretKey {
    pub fn random() -> Self {
        Self(Scalar::random(&mut OsRng))
    }

    /// The public point `rG`.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(ProjectivePoint::GENERATOR * self.0)
    }

    pub fn to_bytes(&self) -> [u8; COORDINATE_SIZE] {
        self.0.to_repr().into()
    }

    /// Interpret 32 big-endian bytes as a scalar, reduced modulo the
    /// curve order.
    pub fn from_bytes(bytes: [u8; COORDINATE_SIZE]) -> Self {
        Self(<Scalar as Reduce<U256>>::reduce_bytes(&bytes.into()))
    }

    /// `0x08 || r(32)`, big-endian, left-padded with zeros.
    pub fn serialize(&self) -> [u8; 1 + COORDINATE_SIZE] {
        let mut data = [0u8; 1 + COORDINATE_SIZE];
        data[0] = HEADER_SECRET;
        data[1..].copy_from_slice(&self.to_bytes());
        data
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() != 1 + COORDINATE_SIZE {
            return Err(Error::InvalidEncoding("bad secret key length"))
        }
        if data[0] != HEADER_SECRET {
            return Err(Error::InvalidEncoding("bad secret key header"))
        }

        let mut bytes = [0u8; COORDINATE_SIZE];
        bytes.copy_from_slice(&data[1..]);
        Ok(Self::from_bytes(bytes))
    }

    pub(crate) fn inner(&self) -> Scalar {
        self.0
    }
}

impl From<Scalar> for SecretKey {
    fn from(x: Scalar) -> Self {
        Self(x)
    }
}

/// An (X, Y) point on the secp256k1 curve.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PublicKey(pub ProjectivePoint);

impl PublicKey {
    pub fn from_secret(secret: SecretKey) -> Self {
        secret.public_key()
    }

    /// `0x04 || X(32) || Y(32)`, big-endian, left-padded with zeros.
    pub fn serialize(&self) -> [u8; 1 + 2 * COORDINATE_SIZE] {
        let mut data = [0u8; 1 + 2 * COORDINATE_SIZE];
        data[0] = HEADER_UNCOMPRESSED;

        // The identity has no affine coordinates and keeps the zeroed
        // padding, matching the (0, 0) convention for the point at
        // infinity.
        let point = self.0.to_affine().to_encoded_point(false);
        if let (Some(x), Some(y)) = (point.x(), point.y()) {
            data[1..1 + COORDINATE_SIZE].copy_from_slice(x.as_slice());
            data[1 + COORDINATE_SIZE..].copy_from_slice(y.as_slice());
        }

        data
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() != 1 + 2 * COORDINATE_SIZE {
            return Err(Error::InvalidEncoding("bad public key length"))
        }
        if data[0] != HEADER_UNCOMPRESSED {
            return Err(Error::InvalidEncoding("bad public key header"))
        }

        Self::from_sec1(data)
    }

    /// `(0x02 if Y even else 0x03) || X(32)`.
    pub fn compress(&self) -> [u8; 1 + COORDINATE_SIZE] {
        let mut data = [0u8; 1 + COORDINATE_SIZE];
        data[0] = HEADER_COMPRESSED_EVEN;

        let point = self.0.to_affine().to_encoded_point(true);
        if point.len() == data.len() {
            data.copy_from_slice(point.as_bytes());
        }

        data
    }

    pub fn uncompress(data: &[u8]) -> Result<Self> {
        if data.len() != 1 + COORDINATE_SIZE {
            return Err(Error::InvalidEncoding("bad compressed key length"))
        }
        if data[0] != HEADER_COMPRESSED_EVEN && data[0] != HEADER_COMPRESSED_ODD {
            return Err(Error::InvalidEncoding("bad compressed key header"))
        }

        Self::from_sec1(data)
    }

    fn from_sec1(data: &[u8]) -> Result<Self> {
        let point = EncodedPoint::from_bytes(data)
            .map_err(|_| Error::InvalidEncoding("malformed curve point"))?;

        match Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&point)) {
            Some(affine) => Ok(Self(affine.into())),
            None => Err(Error::InvalidEncoding("point not on curve")),
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.compress()))
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(encoded: &str) -> Result<Self> {
        let decoded =
            hex::decode(encoded).map_err(|_| Error::InvalidEncoding("bad hex public key"))?;
        match decoded.len() {
            n if n == 1 + COORDINATE_SIZE => Self::uncompress(&decoded),
            _ => Self::deserialize(&decoded),
        }
    }
}

impl Encodable for PublicKey {
    fn encode<S: io::Write>(&self, s: &mut S) -> io::Result<usize> {
        s.write_slice(&self.serialize())?;
        Ok(1 + 2 * COORDINATE_SIZE)
    }
}

impl Decodable for PublicKey {
    fn decode<D: io::Read>(d: &mut D) -> io::Result<Self> {
        let mut data = [0u8; 1 + 2 * COORDINATE_SIZE];
        d.read_slice(&mut data)?;
        Self::deserialize(&data)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad public key"))
    }
}

impl serde::Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.serialize()))
    }
}

impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_str(&encoded).map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for SecretKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.serialize()))
    }
}

impl<'de> serde::Deserialize<'de> for SecretKey {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = hex::decode(&encoded).map_err(serde::de::Error::custom)?;
        SecretKey::deserialize(&decoded).map_err(serde::de::Error::custom)
    }
}
