//! Instruction argument encoding for the launch program
//!
//! The program's entry points use 8-byte discriminators (sha256 of
//! `global:<method>`) followed by borsh-encoded arguments. Account decoding
//! skips the program's 8-byte account discriminator.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use crate::errors::EngineError;
use crate::types::{
    Creator, EndSettings, GatekeeperConfig, HiddenSettings, WhitelistMintSettings,
};

/// Discriminator for a program method
pub fn discriminator(method: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{method}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Encode discriminator + borsh args into instruction data
pub fn encode<T: BorshSerialize>(method: &str, args: &T) -> Result<Vec<u8>, EngineError> {
    let mut data = discriminator(method).to_vec();
    args.serialize(&mut data)
        .map_err(|e| EngineError::MalformedRequest(format!("argument encoding ({method}): {e}")))?;
    Ok(data)
}

/// Encode a zero-argument method
pub fn encode_bare(method: &str) -> Vec<u8> {
    discriminator(method).to_vec()
}

/// Decode a program-owned account, skipping its 8-byte discriminator
pub fn decode_account<T: BorshDeserialize>(data: &[u8], what: &str) -> Result<T, EngineError> {
    if data.len() < 8 {
        return Err(EngineError::MalformedRequest(format!(
            "{what} account too short ({} bytes)",
            data.len()
        )));
    }
    // Trailing zero padding is expected for accounts sized ahead of content
    let mut slice = &data[8..];
    T::deserialize(&mut slice)
        .map_err(|e| EngineError::MalformedRequest(format!("{what} account decoding: {e}")))
}

/// Sale parameters as the program stores and accepts them
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SaleData {
    pub uuid: String,
    pub price: u64,
    pub symbol: String,
    pub seller_fee_basis_points: u16,
    pub max_supply: u64,
    pub is_mutable: bool,
    pub retain_authority: bool,
    pub go_live_date: Option<i64>,
    pub end_settings: Option<EndSettings>,
    pub creators: Vec<Creator>,
    pub hidden_settings: Option<HiddenSettings>,
    pub whitelist_mint_settings: Option<WhitelistMintSettings>,
    pub items_available: u64,
    pub gatekeeper: Option<GatekeeperConfig>,
}

/// On-ledger machine state (header portion)
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MachineState {
    pub authority: Pubkey,
    pub wallet: Pubkey,
    pub token_mint: Option<Pubkey>,
    pub items_redeemed: u64,
    pub data: SaleData,
}

/// Payment module settings account
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PaymentSettings {
    pub payment_mint: Pubkey,
}

/// Lockup module settings account
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LockupSettings {
    pub release_unix_time: i64,
}

/// Creator-standard module settings account
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CreatorStandardSettings {
    pub creator: Pubkey,
    pub ruleset: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InitializeArgs {
    pub data: SaleData,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UpdateArgs {
    pub data: SaleData,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SetPaymentSettingsArgs {
    pub payment_mint: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SetLockupSettingsArgs {
    pub release_unix_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SetCreatorStandardSettingsArgs {
    pub creator: Pubkey,
    pub ruleset: Pubkey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminator_is_stable_and_distinct() {
        assert_eq!(discriminator("mint_nft"), discriminator("mint_nft"));
        assert_ne!(discriminator("mint_nft"), discriminator("withdraw_funds"));
    }

    #[test]
    fn encode_prefixes_discriminator() {
        let args = SetLockupSettingsArgs {
            release_unix_time: 1_700_000_000,
        };
        let data = encode("set_lockup_settings", &args).unwrap();
        assert_eq!(&data[..8], &discriminator("set_lockup_settings"));
        assert_eq!(data.len(), 8 + 8);
    }

    #[test]
    fn account_decode_skips_discriminator_and_tolerates_padding() {
        let settings = PaymentSettings {
            payment_mint: Pubkey::new_unique(),
        };
        let mut data = vec![0u8; 8];
        settings.serialize(&mut data).unwrap();
        data.extend_from_slice(&[0u8; 64]);

        let decoded: PaymentSettings = decode_account(&data, "payment settings").unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn short_account_is_malformed() {
        let err = decode_account::<PaymentSettings>(&[1, 2, 3], "payment settings").unwrap_err();
        assert!(matches!(err, EngineError::MalformedRequest(_)));
    }
}
