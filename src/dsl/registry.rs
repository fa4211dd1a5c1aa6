//! Read-only lookup tables the compiler consumes: setting names and types,
//! setting prefixes, expression categories, the "Other" alias table and the
//! trigger vocabularies.
//!
//! The built-in tables below are the single source of truth for the default
//! registry. A JSON file with the same shape can extend them at startup
//! (see [`Registry::extend`]); nothing mutates a registry once compilation
//! starts.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalization applied to subscript keys of an expression category.
/// Every variant is idempotent: applying it to its own output is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KeyAlias {
    /// `Food` → `food`
    Lowercase,
    /// `windmill` → `city-windmill`; keys that already carry a namespace are
    /// left alone.
    Namespace { default: String },
    /// Explicit renames.
    Table { entries: IndexMap<String, String> },
}

impl KeyAlias {
    pub fn apply(&self, key: &str) -> String {
        match self {
            KeyAlias::Lowercase => key.to_lowercase(),
            KeyAlias::Namespace { default } => {
                if key.contains('-') {
                    key.to_string()
                } else {
                    format!("{default}-{key}")
                }
            }
            KeyAlias::Table { entries } => entries
                .get(key)
                .cloned()
                .unwrap_or_else(|| key.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixDef {
    pub prefix: String,
    pub allowed_suffixes: Vec<String>,
    pub value_description: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionDef {
    #[serde(default, rename = "type")]
    pub ty: Option<ValueType>,
    #[serde(default)]
    pub allowed_values: Option<Vec<String>>,
    pub value_description: String,
    #[serde(default)]
    pub alias: Option<KeyAlias>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherExpressionDef {
    pub alias_for: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerVocab {
    /// Lowercase name the runtime knows this condition/action by.
    #[serde(rename = "type")]
    pub ty: String,
    pub allowed_values: Vec<String>,
    pub value_description: String,
    /// Prepended to ids in the generated trigger (`lhc` → `arpalhc`).
    #[serde(default)]
    pub id_prefix: Option<String>,
}

impl TriggerVocab {
    /// Canonical id for `id`, accepting both the user-facing and the already
    /// prefixed spelling. `None` when the id is not in the vocabulary.
    pub fn canonical_id(&self, id: &str) -> Option<String> {
        let allowed = |candidate: &str| self.allowed_values.iter().any(|v| v == candidate);
        match &self.id_prefix {
            Some(prefix) => {
                if allowed(id) {
                    Some(format!("{prefix}{id}"))
                } else {
                    id.strip_prefix(prefix.as_str())
                        .filter(|rest| allowed(rest))
                        .map(|_| id.to_string())
                }
            }
            None => allowed(id).then(|| id.to_string()),
        }
    }
}

/// Expression categories with special meaning to the passes.
pub const SETTING_CURRENT: &str = "SettingCurrent";
pub const SETTING_DEFAULT: &str = "SettingDefault";
pub const OTHER: &str = "Other";
pub const EVAL: &str = "Eval";
/// Requirement type of the synthetic condition linking chained actions.
pub const CHAIN: &str = "chain";

pub fn is_setting_base(name: &str) -> bool {
    name == SETTING_CURRENT || name == SETTING_DEFAULT
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registry {
    pub settings: IndexMap<String, ValueType>,
    pub prefixes: IndexMap<String, PrefixDef>,
    pub expressions: IndexMap<String, ExpressionDef>,
    pub other_expressions: IndexMap<String, OtherExpressionDef>,
    pub trigger_conditions: IndexMap<String, TriggerVocab>,
    pub trigger_actions: IndexMap<String, TriggerVocab>,
}

impl Registry {
    /// Registry built from the static tables in this module.
    pub fn builtin() -> Self {
        let strings = |values: &[&str]| values.iter().map(|v| (*v).to_string()).collect::<Vec<_>>();

        let settings = BUILTIN_SETTINGS
            .iter()
            .map(|(name, ty)| ((*name).to_string(), *ty))
            .collect();

        let prefixes = BUILTIN_PREFIXES
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    PrefixDef {
                        prefix: p.prefix.to_string(),
                        allowed_suffixes: strings(p.suffixes),
                        value_description: p.description.to_string(),
                        ty: p.ty,
                    },
                )
            })
            .collect();

        let expressions = BUILTIN_EXPRESSIONS
            .iter()
            .map(|e| {
                let alias = match e.alias {
                    BuiltinAlias::None => None,
                    BuiltinAlias::Lowercase => Some(KeyAlias::Lowercase),
                    BuiltinAlias::Namespace(default) => Some(KeyAlias::Namespace {
                        default: default.to_string(),
                    }),
                };
                (
                    e.name.to_string(),
                    ExpressionDef {
                        ty: e.ty,
                        allowed_values: e.values.map(strings),
                        value_description: e.description.to_string(),
                        alias,
                    },
                )
            })
            .collect();

        let other_expressions = BUILTIN_OTHER
            .iter()
            .map(|(name, alias_for, ty)| {
                (
                    (*name).to_string(),
                    OtherExpressionDef {
                        alias_for: (*alias_for).to_string(),
                        ty: *ty,
                    },
                )
            })
            .collect();

        let vocab = |table: &[BuiltinVocab]| {
            table
                .iter()
                .map(|v| {
                    (
                        v.name.to_string(),
                        TriggerVocab {
                            ty: v.ty.to_string(),
                            allowed_values: strings(v.values),
                            value_description: v.description.to_string(),
                            id_prefix: v.id_prefix.map(str::to_string),
                        },
                    )
                })
                .collect::<IndexMap<_, _>>()
        };

        Self {
            settings,
            prefixes,
            expressions,
            other_expressions,
            trigger_conditions: vocab(BUILTIN_TRIGGER_CONDITIONS),
            trigger_actions: vocab(BUILTIN_TRIGGER_ACTIONS),
        }
    }

    /// Merge `other` over `self`; entries with the same name are replaced.
    pub fn extend(&mut self, other: Registry) {
        self.settings.extend(other.settings);
        self.prefixes.extend(other.prefixes);
        self.expressions.extend(other.expressions);
        self.other_expressions.extend(other.other_expressions);
        self.trigger_conditions.extend(other.trigger_conditions);
        self.trigger_actions.extend(other.trigger_actions);
    }

    /// Type of a concrete setting id, either declared directly or generated
    /// by a prefix (`smelter_fuel_p_` + `Coal`).
    pub fn setting_type(&self, name: &str) -> Option<ValueType> {
        if let Some(ty) = self.settings.get(name) {
            return Some(*ty);
        }
        self.prefixes.values().find_map(|p| {
            name.strip_prefix(p.prefix.as_str())
                .filter(|suffix| p.allowed_suffixes.iter().any(|s| s == suffix))
                .map(|_| p.ty)
        })
    }

    pub fn prefix(&self, name: &str) -> Option<&PrefixDef> {
        self.prefixes.get(name)
    }

    pub fn expression(&self, name: &str) -> Option<&ExpressionDef> {
        self.expressions.get(name)
    }

    pub fn other_expression(&self, name: &str) -> Option<&OtherExpressionDef> {
        self.other_expressions.get(name)
    }

    /// Reverse "Other" lookup: the entry whose `alias_for` is `key`.
    pub fn other_alias_target(&self, key: &str) -> Option<&OtherExpressionDef> {
        self.other_expressions.values().find(|o| o.alias_for == key)
    }

    /// Condition vocabulary by user-facing name, or by its runtime type so
    /// already-normalized triggers are recognized.
    pub fn trigger_condition(&self, name: &str) -> Option<&TriggerVocab> {
        self.trigger_conditions
            .get(name)
            .or_else(|| self.trigger_conditions.values().find(|v| v.ty == name))
    }

    pub fn trigger_action(&self, name: &str) -> Option<&TriggerVocab> {
        self.trigger_actions
            .get(name)
            .or_else(|| self.trigger_actions.values().find(|v| v.ty == name))
    }

    /// Whether `name` is taken by any registry table that identifiers in
    /// expressions can refer to.
    pub fn is_reserved_name(&self, name: &str) -> bool {
        self.expressions.contains_key(name)
            || self.prefixes.contains_key(name)
            || self.other_expressions.contains_key(name)
    }
}

// ── Built-in tables ──────────────────────────────────────────────

struct BuiltinPrefix {
    name: &'static str,
    prefix: &'static str,
    suffixes: &'static [&'static str],
    description: &'static str,
    ty: ValueType,
}

enum BuiltinAlias {
    None,
    Lowercase,
    Namespace(&'static str),
}

struct BuiltinExpression {
    name: &'static str,
    ty: Option<ValueType>,
    values: Option<&'static [&'static str]>,
    description: &'static str,
    alias: BuiltinAlias,
}

struct BuiltinVocab {
    name: &'static str,
    ty: &'static str,
    values: &'static [&'static str],
    description: &'static str,
    id_prefix: Option<&'static str>,
}

static RESOURCES: &[&str] = &[
    "Food", "Lumber", "Chrysotile", "Stone", "Crystal", "Furs", "Copper", "Iron", "Aluminium",
    "Cement", "Coal", "Oil", "Uranium", "Steel", "Titanium", "Alloy", "Polymer", "Iridium",
    "Helium_3", "Deuterium", "Neutronium", "Adamantite", "Infernite", "Elerium", "Nano_Tube",
    "Graphene", "Stanene", "Money", "Knowledge", "Plywood", "Brick", "Wrought_Iron",
    "Sheet_Metal", "Mythril",
];

static TRADEABLE: &[&str] = &[
    "Food", "Lumber", "Chrysotile", "Stone", "Crystal", "Furs", "Copper", "Iron", "Aluminium",
    "Cement", "Coal", "Oil", "Uranium", "Steel", "Titanium", "Alloy", "Polymer", "Iridium",
    "Helium_3",
];

static SMELTER_FUELS: &[&str] = &["Wood", "Coal", "Oil", "Inferno"];

static BUILDINGS: &[&str] = &[
    "city-windmill", "city-bank", "city-farm", "city-mill", "city-silo", "city-shed",
    "city-library", "city-university", "city-smelter", "city-factory", "city-mine",
    "city-coal_mine", "city-oil_well", "city-temple", "city-amphitheatre", "city-casino",
    "space-satellite", "space-propellant_depot", "space-gps", "space-moon_base",
];

static TECHS: &[&str] = &[
    "tech-club", "tech-agriculture", "tech-farm_house", "tech-mining", "tech-bronze_pick",
    "tech-banking", "tech-windmill", "tech-smelting", "tech-steel", "tech-electricity",
    "tech-industrialization", "tech-rocketry", "tech-space", "tech-mad", "tech-theology",
];

static JOBS: &[&str] = &[
    "unemployed", "hunter", "farmer", "lumberjack", "quarry_worker", "crystal_miner",
    "scavenger", "miner", "coal_miner", "cement_worker", "entertainer", "priest", "professor",
    "scientist", "banker", "colonist", "space_miner", "hell_surveyor", "archaeologist",
    "pit_miner", "crew",
];

static ARPA_PROJECTS: &[&str] = &[
    "lhc", "stock_exchange", "launch_facility", "monument", "railway", "nexus", "roid_eject",
    "syphon",
];

static UNIVERSES: &[&str] = &["standard", "heavy", "antimatter", "evil", "micro", "magic"];

static GOVERNMENTS: &[&str] = &[
    "anarchy", "autocracy", "democracy", "oligarchy", "theocracy", "republic", "socialist",
    "corpocracy", "technocracy", "federation", "magic",
];

static BUILTIN_SETTINGS: &[(&str, ValueType)] = &[
    ("autoEvolution", ValueType::Boolean),
    ("autoMarket", ValueType::Boolean),
    ("autoResearch", ValueType::Boolean),
    ("autoBuild", ValueType::Boolean),
    ("autoJobs", ValueType::Boolean),
    ("autoSmelter", ValueType::Boolean),
    ("autoCraft", ValueType::Boolean),
    ("autoTrigger", ValueType::Boolean),
    ("prestigeType", ValueType::String),
    ("minimumMoney", ValueType::Number),
    ("tradeRouteMinimumMoneyPerSecond", ValueType::Number),
    ("jobLumberWeighting", ValueType::Number),
];

static BUILTIN_PREFIXES: &[BuiltinPrefix] = &[
    BuiltinPrefix {
        name: "Sell", prefix: "sell", suffixes: TRADEABLE,
        description: "resource", ty: ValueType::Boolean,
    },
    BuiltinPrefix {
        name: "Buy", prefix: "buy", suffixes: TRADEABLE,
        description: "resource", ty: ValueType::Boolean,
    },
    BuiltinPrefix {
        name: "SellRatio", prefix: "res_sell_r_", suffixes: TRADEABLE,
        description: "resource", ty: ValueType::Number,
    },
    BuiltinPrefix {
        name: "BuyRatio", prefix: "res_buy_r_", suffixes: TRADEABLE,
        description: "resource", ty: ValueType::Number,
    },
    BuiltinPrefix {
        name: "SmelterFuelPriority", prefix: "smelter_fuel_p_", suffixes: SMELTER_FUELS,
        description: "fuel", ty: ValueType::Number,
    },
    BuiltinPrefix {
        name: "JobPriority", prefix: "job_p_", suffixes: JOBS,
        description: "job", ty: ValueType::Number,
    },
    BuiltinPrefix {
        name: "AutoBuild", prefix: "bat", suffixes: BUILDINGS,
        description: "building", ty: ValueType::Boolean,
    },
    BuiltinPrefix {
        name: "BuildingMax", prefix: "bld_m_", suffixes: BUILDINGS,
        description: "building", ty: ValueType::Number,
    },
];

static BUILTIN_EXPRESSIONS: &[BuiltinExpression] = &[
    BuiltinExpression {
        name: SETTING_CURRENT, ty: None, values: None,
        description: "setting", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: SETTING_DEFAULT, ty: None, values: None,
        description: "setting", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: OTHER, ty: None, values: None,
        description: "expression", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: EVAL, ty: None, values: None,
        description: "expression", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: "ResourceQuantity", ty: Some(ValueType::Number), values: Some(RESOURCES),
        description: "resource", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: "ResourceStorage", ty: Some(ValueType::Number), values: Some(RESOURCES),
        description: "resource", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: "ResourceIncome", ty: Some(ValueType::Number), values: Some(RESOURCES),
        description: "resource", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: "ResourceRatio", ty: Some(ValueType::Number), values: Some(RESOURCES),
        description: "resource", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: "ResourceDemanded", ty: Some(ValueType::Boolean), values: Some(RESOURCES),
        description: "resource", alias: BuiltinAlias::None,
    },
    BuiltinExpression {
        name: "BuildingCount", ty: Some(ValueType::Number), values: Some(BUILDINGS),
        description: "building", alias: BuiltinAlias::Namespace("city"),
    },
    BuiltinExpression {
        name: "BuildingUnlocked", ty: Some(ValueType::Boolean), values: Some(BUILDINGS),
        description: "building", alias: BuiltinAlias::Namespace("city"),
    },
    BuiltinExpression {
        name: "ResearchComplete", ty: Some(ValueType::Boolean), values: Some(TECHS),
        description: "tech", alias: BuiltinAlias::Namespace("tech"),
    },
    BuiltinExpression {
        name: "ResearchUnlocked", ty: Some(ValueType::Boolean), values: Some(TECHS),
        description: "tech", alias: BuiltinAlias::Namespace("tech"),
    },
    BuiltinExpression {
        name: "JobCount", ty: Some(ValueType::Number), values: Some(JOBS),
        description: "job", alias: BuiltinAlias::Lowercase,
    },
    BuiltinExpression {
        name: "JobMax", ty: Some(ValueType::Number), values: Some(JOBS),
        description: "job", alias: BuiltinAlias::Lowercase,
    },
    BuiltinExpression {
        name: "Universe", ty: Some(ValueType::Boolean), values: Some(UNIVERSES),
        description: "universe", alias: BuiltinAlias::Lowercase,
    },
    BuiltinExpression {
        name: "Government", ty: Some(ValueType::Boolean), values: Some(GOVERNMENTS),
        description: "government", alias: BuiltinAlias::Lowercase,
    },
];

static BUILTIN_OTHER: &[(&str, &str, ValueType)] = &[
    ("BrokenCars", "bcar", ValueType::Number),
    ("Starving", "strv", ValueType::Boolean),
    ("MadToggle", "madt", ValueType::Boolean),
    ("Citizens", "pop", ValueType::Number),
    ("Wounded", "wnd", ValueType::Number),
];

static BUILTIN_TRIGGER_CONDITIONS: &[BuiltinVocab] = &[
    BuiltinVocab {
        name: "Built", ty: "built", values: BUILDINGS,
        description: "building", id_prefix: None,
    },
    BuiltinVocab {
        name: "Researched", ty: "researched", values: TECHS,
        description: "tech", id_prefix: None,
    },
    BuiltinVocab {
        name: "Unlocked", ty: "unlocked", values: TECHS,
        description: "tech", id_prefix: None,
    },
];

static BUILTIN_TRIGGER_ACTIONS: &[BuiltinVocab] = &[
    BuiltinVocab {
        name: "Research", ty: "research", values: TECHS,
        description: "tech", id_prefix: None,
    },
    BuiltinVocab {
        name: "Build", ty: "build", values: BUILDINGS,
        description: "building", id_prefix: None,
    },
    BuiltinVocab {
        name: "Arpa", ty: "arpa", values: ARPA_PROJECTS,
        description: "project", id_prefix: Some("arpa"),
    },
];
