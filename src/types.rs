//! Common types shared across the composition and broadcast pipeline

use std::fmt;
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;

/// Optional feature modules a launch machine can carry.
///
/// A module is active for a machine iff its settings account exists on the
/// ledger at probe time. The discriminant order below is also the fixed
/// priority order in which extension account segments are appended to an
/// action instruction; the receiving program validates account lists
/// positionally, so this order is part of its binary contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleTag {
    /// Mint price is paid in an SPL token rather than lamports
    Payment,
    /// The minted token is delivered to the recipient's token account within
    /// the same instruction
    InlineReceipt,
    /// Minted tokens are time-locked until a configured release
    Lockup,
    /// Minting is gated on a permission record
    Permissioned,
    /// Creator-standard verification and collection linking
    CreatorStandard,
}

impl ModuleTag {
    /// All module tags in extension priority order
    pub const PRIORITY: [ModuleTag; 5] = [
        ModuleTag::Payment,
        ModuleTag::InlineReceipt,
        ModuleTag::Lockup,
        ModuleTag::Permissioned,
        ModuleTag::CreatorStandard,
    ];

    pub const COUNT: usize = 5;

    /// PDA seed prefix for this module's settings account
    pub fn seed(&self) -> &'static [u8] {
        match self {
            ModuleTag::Payment => b"payment_settings",
            ModuleTag::InlineReceipt => b"receipt_settings",
            ModuleTag::Lockup => b"lockup_settings",
            ModuleTag::Permissioned => b"permissioned_settings",
            ModuleTag::CreatorStandard => b"ccs_settings",
        }
    }

    /// Derive this module's settings address for a machine
    pub fn settings_address(&self, machine: &Pubkey, program: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[self.seed(), machine.as_ref()], program).0
    }
}

impl fmt::Display for ModuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleTag::Payment => "payment",
            ModuleTag::InlineReceipt => "inline-receipt",
            ModuleTag::Lockup => "lockup",
            ModuleTag::Permissioned => "permissioned",
            ModuleTag::CreatorStandard => "creator-standard",
        };
        f.write_str(name)
    }
}

/// Set of active modules for one machine, as observed by the probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveModules {
    set: [bool; ModuleTag::COUNT],
}

impl ActiveModules {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn activate(&mut self, tag: ModuleTag) {
        self.set[tag as usize] = true;
    }

    pub fn with(mut self, tag: ModuleTag) -> Self {
        self.activate(tag);
        self
    }

    pub fn contains(&self, tag: ModuleTag) -> bool {
        self.set[tag as usize]
    }

    /// Active tags in fixed priority order, regardless of activation order
    pub fn iter(&self) -> impl Iterator<Item = ModuleTag> + '_ {
        ModuleTag::PRIORITY
            .into_iter()
            .filter(|tag| self.contains(*tag))
    }

    pub fn is_empty(&self) -> bool {
        !self.set.iter().any(|b| *b)
    }
}

/// One royalty recipient in the machine's creator list
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Creator {
    pub address: Pubkey,
    pub verified: bool,
    /// Royalty share in percent; all creators must sum to 100
    pub share: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum EndSettingType {
    Date,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EndSettings {
    pub kind: EndSettingType,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct HiddenSettings {
    pub name: String,
    pub uri: String,
    pub hash: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum WhitelistMintMode {
    BurnEveryTime,
    NeverBurn,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WhitelistMintSettings {
    pub mode: WhitelistMintMode,
    pub mint: Pubkey,
    pub presale: bool,
    pub discount_price: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    pub gatekeeper_network: Pubkey,
    pub expire_on_use: bool,
}

/// Business parameters of one sale machine. All optional feature parameters
/// are independently nullable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleParams {
    pub price: u64,
    pub symbol: String,
    pub seller_fee_basis_points: u16,
    pub max_supply: u64,
    /// Capacity of the machine's config-line storage; drives account sizing
    pub items_available: u64,
    pub is_mutable: bool,
    pub retain_authority: bool,
    /// Unix seconds at which minting opens
    pub go_live_date: Option<i64>,
    pub creators: Vec<Creator>,
    pub end_settings: Option<EndSettings>,
    pub hidden_settings: Option<HiddenSettings>,
    pub whitelist_settings: Option<WhitelistMintSettings>,
    pub gatekeeper: Option<GatekeeperConfig>,
}

/// Per-module parameters supplied when a module is requested at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleInit {
    Payment { payment_mint: Pubkey },
    InlineReceipt,
    Lockup { release_unix_time: i64 },
    Permissioned,
    CreatorStandard { creator: Pubkey, ruleset: Pubkey },
}

impl ModuleInit {
    pub fn tag(&self) -> ModuleTag {
        match self {
            ModuleInit::Payment { .. } => ModuleTag::Payment,
            ModuleInit::InlineReceipt => ModuleTag::InlineReceipt,
            ModuleInit::Lockup { .. } => ModuleTag::Lockup,
            ModuleInit::Permissioned => ModuleTag::Permissioned,
            ModuleInit::CreatorStandard { .. } => ModuleTag::CreatorStandard,
        }
    }
}

/// A signing party. Exposes only a sign-this-transaction capability, never
/// raw key material.
pub type SigningParty = Arc<dyn Signer + Send + Sync>;

/// Create a new machine with the given parameters and requested modules.
/// Each attempt generates a fresh machine identity.
#[derive(Clone)]
pub struct CreateFlow {
    /// Controlling identity; also funds account creation and pays fees
    pub authority: SigningParty,
    pub params: SaleParams,
    pub modules: Vec<ModuleInit>,
}

/// Mint one item from an existing machine
#[derive(Clone)]
pub struct MintFlow {
    pub machine: Pubkey,
    /// Receives the minted token; signs as mint and update authority
    pub recipient: SigningParty,
    /// Optional separate fee-paying party; defaults to the recipient
    pub payer: Option<SigningParty>,
    /// Compute unit limit for the mint transaction (0 = omit)
    pub compute_unit_limit: u32,
    /// Priority fee in micro-lamports (0 = omit)
    pub priority_fee: u64,
}

impl MintFlow {
    pub fn payer_address(&self) -> Pubkey {
        self.payer
            .as_ref()
            .unwrap_or(&self.recipient)
            .pubkey()
    }
}

/// Overrides applied to the machine's current on-ledger parameters.
/// Unset fields are preserved from the decoded state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleUpdate {
    pub price: Option<u64>,
    pub max_supply: Option<u64>,
    pub go_live_date: Option<i64>,
    pub end_settings: Option<EndSettings>,
    pub is_mutable: Option<bool>,
}

/// Rewrite an existing machine's sale parameters
#[derive(Clone)]
pub struct UpdateFlow {
    pub machine: Pubkey,
    pub authority: SigningParty,
    pub update: SaleUpdate,
}

/// Drain an existing machine's funds to its authority
#[derive(Clone)]
pub struct WithdrawFlow {
    pub machine: Pubkey,
    pub authority: SigningParty,
}

/// Variant payload selecting which composition branch the engine runs
#[derive(Clone)]
pub enum FlowRequest {
    Create(CreateFlow),
    Mint(MintFlow),
    Update(UpdateFlow),
    Withdraw(WithdrawFlow),
}

impl FlowRequest {
    pub fn name(&self) -> &'static str {
        match self {
            FlowRequest::Create(_) => "create",
            FlowRequest::Mint(_) => "mint",
            FlowRequest::Update(_) => "update",
            FlowRequest::Withdraw(_) => "withdraw",
        }
    }
}

/// Terminal success of an execute call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub signature: Signature,
    /// The machine created or acted upon
    pub target: Pubkey,
    /// Full cycles run, including the successful one
    pub attempts: u32,
}

/// Short machine identifier used in initialize data, derived from the
/// machine address
pub fn uuid_from_address(address: &Pubkey) -> String {
    address.to_string().chars().take(6).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_iteration_ignores_activation_order() {
        let mut modules = ActiveModules::none();
        modules.activate(ModuleTag::CreatorStandard);
        modules.activate(ModuleTag::Payment);
        modules.activate(ModuleTag::Lockup);

        let order: Vec<ModuleTag> = modules.iter().collect();
        assert_eq!(
            order,
            vec![
                ModuleTag::Payment,
                ModuleTag::Lockup,
                ModuleTag::CreatorStandard
            ]
        );
    }

    #[test]
    fn settings_addresses_are_distinct_per_module() {
        let machine = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let mut seen = std::collections::HashSet::new();
        for tag in ModuleTag::PRIORITY {
            assert!(seen.insert(tag.settings_address(&machine, &program)));
        }
    }

    #[test]
    fn uuid_is_six_chars() {
        let addr = Pubkey::new_unique();
        let uuid = uuid_from_address(&addr);
        assert_eq!(uuid.len(), 6);
        assert!(addr.to_string().starts_with(&uuid));
    }
}
