// Built-in feature modules: swap, defi, nft.
//
// The matching gateway services are registered separately by
// `mcp::config::register_default_services`; bindings here only name them.

use std::collections::BTreeMap;

use super::descriptor::{ModuleCategory, ModuleDescriptor, ModuleRoute, ServiceBinding};
use super::ModuleRegistry;

const GATEWAY_PATH: &str = "/api/mcp";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn named(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn route(path: &str, surface: &str, exact: bool, permission: &str) -> ModuleRoute {
    ModuleRoute {
        path: path.to_string(),
        surface: surface.to_string(),
        exact,
        protected: true,
        permissions: vec![permission.to_string()],
    }
}

fn binding(key: &str, service: &str, methods: &[&str]) -> BTreeMap<String, ServiceBinding> {
    BTreeMap::from([(
        key.to_string(),
        ServiceBinding {
            name: service.to_string(),
            methods: strings(methods),
            base_url: Some(GATEWAY_PATH.to_string()),
        },
    )])
}

fn wallet_providers() -> Vec<String> {
    strings(&["default", "metamask", "walletconnect"])
}

pub fn swap_module() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "swap".to_string(),
        name: "Token Swap".to_string(),
        description: "Fast, secure token exchange".to_string(),
        version: "1.0.0".to_string(),
        icon: Some("💱".to_string()),
        category: ModuleCategory::Swap,
        permissions: strings(&["read:wallet", "write:transaction", "read:history", "api:access"]),
        oauth_providers: wallet_providers(),
        routes: vec![
            route("/swap", "SwapPage", true, "read:wallet"),
            route("/swap/history", "SwapHistory", false, "read:history"),
        ],
        components: named(&[
            ("SwapInterface", "swap/SwapInterface"),
            ("TokenSelector", "swap/TokenSelector"),
            ("ExchangePlansSelector", "swap/ExchangePlansSelector"),
            ("SwapHistory", "swap/SwapHistory"),
            ("SwapSettings", "swap/SwapSettings"),
        ]),
        hooks: named(&[
            ("useSwapData", "swap/useSwapData"),
            ("useTokenList", "swap/useTokenList"),
            ("useExchangeRates", "swap/useExchangeRates"),
            ("useSwapExecution", "swap/useSwapExecution"),
        ]),
        services: binding(
            "swapService",
            "swap",
            &["getTokens", "getRates", "executeSwap", "getHistory"],
        ),
        dependencies: Vec::new(),
        enabled: true,
    }
}

pub fn defi_module() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "defi".to_string(),
        name: "Decentralized Finance".to_string(),
        description: "Liquidity mining, staking and lending".to_string(),
        version: "1.0.0".to_string(),
        icon: Some("🏦".to_string()),
        category: ModuleCategory::Defi,
        permissions: strings(&[
            "read:wallet",
            "write:transaction",
            "read:history",
            "manage:positions",
            "api:access",
        ]),
        oauth_providers: wallet_providers(),
        routes: vec![
            route("/defi", "DeFiInterface", true, "read:wallet"),
            route("/defi/pools", "DeFiInterface", false, "read:wallet"),
            route("/defi/staking", "DeFiInterface", false, "manage:positions"),
            route("/defi/positions", "DeFiInterface", false, "read:history"),
        ],
        components: named(&[
            ("DeFiInterface", "defi/DeFiInterface"),
            ("PoolsList", "defi/PoolsList"),
            ("StakingInterface", "defi/StakingInterface"),
            ("PositionsList", "defi/PositionsList"),
        ]),
        hooks: named(&[("useDeFiData", "defi/useDeFiData")]),
        services: binding(
            "defiService",
            "defi",
            &["getPools", "stake", "unstake", "claimRewards", "getPositions"],
        ),
        dependencies: strings(&["swap"]),
        enabled: true,
    }
}

pub fn nft_module() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "nft".to_string(),
        name: "Non-Fungible Tokens".to_string(),
        description: "NFT trading, minting and collection management".to_string(),
        version: "1.0.0".to_string(),
        icon: Some("🎨".to_string()),
        category: ModuleCategory::Nft,
        permissions: strings(&[
            "read:wallet",
            "write:transaction",
            "read:history",
            "manage:collections",
            "api:access",
        ]),
        oauth_providers: wallet_providers(),
        routes: vec![
            route("/nft", "NFTInterface", true, "read:wallet"),
            route("/nft/collections", "NFTInterface", false, "read:wallet"),
            route("/nft/marketplace", "NFTInterface", false, "read:wallet"),
            route("/nft/create", "NFTInterface", false, "manage:collections"),
        ],
        components: named(&[
            ("NFTInterface", "nft/NFTInterface"),
            ("CollectionsList", "nft/CollectionsList"),
            ("NFTMarketplace", "nft/NFTMarketplace"),
            ("NFTCreator", "nft/NFTCreator"),
        ]),
        hooks: named(&[("useNFTData", "nft/useNFTData")]),
        services: binding(
            "nftService",
            "nft",
            &["getCollections", "getTokens", "transfer", "mint", "getMetadata"],
        ),
        dependencies: strings(&["swap"]),
        enabled: true,
    }
}

pub fn builtin_modules() -> Vec<ModuleDescriptor> {
    vec![swap_module(), defi_module(), nft_module()]
}

/// Registers the built-ins through the validating factory path.
pub fn register_builtin_modules(registry: &ModuleRegistry) -> usize {
    builtin_modules()
        .into_iter()
        .filter_map(|m| match registry.create_module(m) {
            Ok(_) => Some(()),
            Err(e) => {
                tracing::error!("Built-in module rejected: {}", e);
                None
            }
        })
        .count()
}
