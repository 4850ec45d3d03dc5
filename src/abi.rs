//! Guardrail interface schema: call encoding and return decoding.
//!
//! DESIGN
//! ======
//! The panel talks to exactly eight contract functions. Each has a fixed
//! argument order and return shape, encoded with the standard Solidity ABI:
//! a 4-byte keccak selector followed by 32-byte words. Only the shapes this
//! schema needs are supported (address, bool, uint256, bytes, address[] and
//! a static `(bool, uint256)` tuple). Changing any of them bumps
//! [`SCHEMA_VERSION`].
//!
//! Decoders are strict: misaligned data, out-of-range offsets, dirty address
//! padding, non-canonical bools and timestamps that overflow `u64` all fail.

use crate::address::{Address, keccak256};

/// Version of the eight-function interface below.
pub const SCHEMA_VERSION: u32 = 1;

/// Storage slot holding the installed transaction guard on a Safe account.
/// `keccak256("guard_manager.guard.address")`.
pub const GUARD_STORAGE_SLOT: [u8; 32] = [
    0x4a, 0x20, 0x4f, 0x62, 0x0c, 0x8c, 0x5c, 0xcd, 0xca, 0x3f, 0xd5, 0x4d, 0x00, 0x3b, 0xad, 0xd8, 0x5b, 0xa5, 0x00,
    0x43, 0x6a, 0x43, 0x1f, 0x0c, 0xbd, 0xa4, 0xf5, 0x58, 0xc9, 0x3c, 0x34, 0xc8,
];

const WORD: usize = 32;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("{function}: return data too short ({len} bytes)")]
    Truncated { function: &'static str, len: usize },
    #[error("{function}: dynamic offset {offset} out of range")]
    BadOffset { function: &'static str, offset: u64 },
    #[error("{function}: value does not fit in 64 bits")]
    Overflow { function: &'static str },
    #[error("{function}: invalid bool word")]
    BadBool { function: &'static str },
    #[error("{function}: dirty address padding")]
    BadAddress { function: &'static str },
}

// =============================================================================
// FUNCTIONS
// =============================================================================

/// The eight operations of the guardrail interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    SetGuard,
    GetStorageAt,
    RemovalSchedule,
    ScheduleGuardRemoval,
    DelegateAllowance,
    ImmediateDelegateAllowance,
    GetDelegates,
    DelegatedAllowance,
}

impl Function {
    pub const ALL: [Self; 8] = [
        Self::SetGuard,
        Self::GetStorageAt,
        Self::RemovalSchedule,
        Self::ScheduleGuardRemoval,
        Self::DelegateAllowance,
        Self::ImmediateDelegateAllowance,
        Self::GetDelegates,
        Self::DelegatedAllowance,
    ];

    /// Canonical signature used to derive the selector.
    #[must_use]
    pub fn signature(self) -> &'static str {
        match self {
            Self::SetGuard => "setGuard(address)",
            Self::GetStorageAt => "getStorageAt(uint256,uint256)",
            Self::RemovalSchedule => "removalSchedule(address)",
            Self::ScheduleGuardRemoval => "scheduleGuardRemoval()",
            Self::DelegateAllowance => "delegateAllowance(address,bool,bool)",
            Self::ImmediateDelegateAllowance => "immediateDelegateAllowance(address,bool)",
            Self::GetDelegates => "getDelegates(address)",
            Self::DelegatedAllowance => "delegatedAllowance(address,address)",
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        let sig = self.signature();
        sig.split('(').next().unwrap_or(sig)
    }

    #[must_use]
    pub fn selector(self) -> [u8; 4] {
        selector(self.signature())
    }
}

/// First four bytes of the keccak hash of a function signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

// =============================================================================
// WORDS
// =============================================================================

fn address_word(address: Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn bool_word(value: bool) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 1] = u8::from(value);
    word
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn call(function: Function, words: &[[u8; WORD]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + words.len() * WORD);
    data.extend_from_slice(&function.selector());
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

fn word_at<'a>(data: &'a [u8], index: usize, function: &'static str) -> Result<&'a [u8], AbiError> {
    let start = index * WORD;
    data.get(start..start + WORD).ok_or(AbiError::Truncated { function, len: data.len() })
}

fn read_u64(word: &[u8], function: &'static str) -> Result<u64, AbiError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow { function });
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(tail))
}

fn read_bool(word: &[u8], function: &'static str) -> Result<bool, AbiError> {
    match read_u64(word, function) {
        Ok(0) => Ok(false),
        Ok(1) => Ok(true),
        _ => Err(AbiError::BadBool { function }),
    }
}

fn read_address(word: &[u8], function: &'static str) -> Result<Address, AbiError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(AbiError::BadAddress { function });
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(Address::from_bytes(bytes))
}

/// Resolve a head offset word into a byte position within `data`.
fn read_offset(data: &[u8], index: usize, function: &'static str) -> Result<usize, AbiError> {
    let offset = read_u64(word_at(data, index, function)?, function)
        .map_err(|_| AbiError::BadOffset { function, offset: u64::MAX })?;
    let position = usize::try_from(offset).map_err(|_| AbiError::BadOffset { function, offset })?;
    if position % WORD != 0 || position.saturating_add(WORD) > data.len() {
        return Err(AbiError::BadOffset { function, offset });
    }
    Ok(position)
}

// =============================================================================
// ENCODING
// =============================================================================

/// `setGuard(address)`, sent to the Safe itself. `Address::ZERO` uninstalls.
#[must_use]
pub fn encode_set_guard(guard: Address) -> Vec<u8> {
    call(Function::SetGuard, &[address_word(guard)])
}

/// `getStorageAt(uint256 offset, uint256 length)`; `length` counts words.
#[must_use]
pub fn encode_get_storage_at(slot: [u8; 32], length: u64) -> Vec<u8> {
    call(Function::GetStorageAt, &[slot, uint_word(length)])
}

#[must_use]
pub fn encode_removal_schedule(safe: Address) -> Vec<u8> {
    call(Function::RemovalSchedule, &[address_word(safe)])
}

#[must_use]
pub fn encode_schedule_guard_removal() -> Vec<u8> {
    call(Function::ScheduleGuardRemoval, &[])
}

#[must_use]
pub fn encode_delegate_allowance(delegate: Address, one_time: bool, reset: bool) -> Vec<u8> {
    call(Function::DelegateAllowance, &[address_word(delegate), bool_word(one_time), bool_word(reset)])
}

#[must_use]
pub fn encode_immediate_delegate_allowance(delegate: Address, one_time: bool) -> Vec<u8> {
    call(Function::ImmediateDelegateAllowance, &[address_word(delegate), bool_word(one_time)])
}

#[must_use]
pub fn encode_get_delegates(account: Address) -> Vec<u8> {
    call(Function::GetDelegates, &[address_word(account)])
}

#[must_use]
pub fn encode_delegated_allowance(safe: Address, delegate: Address) -> Vec<u8> {
    call(Function::DelegatedAllowance, &[address_word(safe), address_word(delegate)])
}

// =============================================================================
// DECODING
// =============================================================================

/// Decode the `bytes` returned by `getStorageAt`.
pub fn decode_storage(data: &[u8]) -> Result<Vec<u8>, AbiError> {
    let function = Function::GetStorageAt.name();
    let position = read_offset(data, 0, function)?;
    let len = read_u64(&data[position..position + WORD], function)?;
    let len = usize::try_from(len).map_err(|_| AbiError::Overflow { function })?;
    let start = position + WORD;
    data.get(start..start.saturating_add(len))
        .map(<[u8]>::to_vec)
        .ok_or(AbiError::Truncated { function, len: data.len() })
}

/// Extract the guard address from a raw storage word.
pub fn guard_from_storage(storage: &[u8]) -> Result<Address, AbiError> {
    let function = Function::GetStorageAt.name();
    let word = storage.get(..WORD).ok_or(AbiError::Truncated { function, len: storage.len() })?;
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(Address::from_bytes(bytes))
}

/// Decode the `uint256` removal timestamp (seconds).
pub fn decode_removal_schedule(data: &[u8]) -> Result<u64, AbiError> {
    let function = Function::RemovalSchedule.name();
    read_u64(word_at(data, 0, function)?, function)
}

/// Decode the `address[]` returned by `getDelegates`.
pub fn decode_delegates(data: &[u8]) -> Result<Vec<Address>, AbiError> {
    let function = Function::GetDelegates.name();
    let position = read_offset(data, 0, function)?;
    let count = read_u64(&data[position..position + WORD], function)?;
    let count = usize::try_from(count).map_err(|_| AbiError::Overflow { function })?;
    let body = &data[position + WORD..];
    if count.checked_mul(WORD).is_none_or(|needed| needed > body.len()) {
        return Err(AbiError::Truncated { function, len: data.len() });
    }
    (0..count).map(|i| read_address(word_at(body, i, function)?, function)).collect()
}

/// Decode `(bool oneTimeAllowance, uint256 allowedTimestamp)`.
pub fn decode_delegated_allowance(data: &[u8]) -> Result<(bool, u64), AbiError> {
    let function = Function::DelegatedAllowance.name();
    let one_time = read_bool(word_at(data, 0, function)?, function)?;
    let allowed_timestamp = read_u64(word_at(data, 1, function)?, function)?;
    Ok((one_time, allowed_timestamp))
}

// =============================================================================
// TEST ENCODERS
// =============================================================================

/// Return-data builders used by mock read sinks.
#[cfg(test)]
pub(crate) mod returns {
    use super::*;

    pub fn uint(value: u64) -> Vec<u8> {
        uint_word(value).to_vec()
    }

    pub fn allowance(one_time: bool, allowed_timestamp: u64) -> Vec<u8> {
        [bool_word(one_time), uint_word(allowed_timestamp)].concat()
    }

    pub fn delegates(addresses: &[Address]) -> Vec<u8> {
        let mut out = uint_word(WORD as u64).to_vec();
        out.extend_from_slice(&uint_word(addresses.len() as u64));
        for address in addresses {
            out.extend_from_slice(&address_word(*address));
        }
        out
    }

    pub fn storage_with_guard(guard: Address) -> Vec<u8> {
        let mut out = uint_word(WORD as u64).to_vec();
        out.extend_from_slice(&uint_word(WORD as u64));
        out.extend_from_slice(&address_word(guard));
        out
    }
}

#[cfg(test)]
#[path = "abi_test.rs"]
mod tests;
