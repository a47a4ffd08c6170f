//! Translation between configured presence values and serenity's.
//!
//! Both directions go through one static table per enum, so a mapping can't drift out of sync.

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serenity::all::ActivityData;
use serenity::all::ActivityType;
use serenity::all::OnlineStatus;

/// Kind of activity shown under the bot's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    Playing,
    Streaming,
    Listening,
    Watching,
    Competing,
    Custom,
}

/// Online status of the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Online,
    Idle,
    DoNotDisturb,
    Invisible,
    Offline,
}

const ACTIVITY_TABLE: [(ActivityKind, ActivityType); 6] = [
    (ActivityKind::Playing, ActivityType::Playing),
    (ActivityKind::Streaming, ActivityType::Streaming),
    (ActivityKind::Listening, ActivityType::Listening),
    (ActivityKind::Watching, ActivityType::Watching),
    (ActivityKind::Competing, ActivityType::Competing),
    (ActivityKind::Custom, ActivityType::Custom),
];

const STATUS_TABLE: [(Status, OnlineStatus); 5] = [
    (Status::Online, OnlineStatus::Online),
    (Status::Idle, OnlineStatus::Idle),
    (Status::DoNotDisturb, OnlineStatus::DoNotDisturb),
    (Status::Invisible, OnlineStatus::Invisible),
    (Status::Offline, OnlineStatus::Offline),
];

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::Playing,
        ActivityKind::Streaming,
        ActivityKind::Listening,
        ActivityKind::Watching,
        ActivityKind::Competing,
        ActivityKind::Custom,
    ];

    pub fn to_serenity(self) -> ActivityType {
        ACTIVITY_TABLE
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, ty)| *ty)
            .unwrap_or(ActivityType::Playing)
    }

    /// `None` for activity types this bot never sets.
    pub fn from_serenity(ty: ActivityType) -> Option<Self> {
        ACTIVITY_TABLE
            .iter()
            .find(|(_, known)| *known == ty)
            .map(|(kind, _)| *kind)
    }
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Online,
        Status::Idle,
        Status::DoNotDisturb,
        Status::Invisible,
        Status::Offline,
    ];

    pub fn to_serenity(self) -> OnlineStatus {
        STATUS_TABLE
            .iter()
            .find(|(status, _)| *status == self)
            .map(|(_, online)| *online)
            .unwrap_or(OnlineStatus::Online)
    }

    pub fn from_serenity(status: OnlineStatus) -> Option<Self> {
        STATUS_TABLE
            .iter()
            .find(|(_, known)| *known == status)
            .map(|(status, _)| *status)
    }
}

/// Case insensitive parse, used for environment overrides.
fn parse_variant<T: Copy + std::fmt::Debug>(all: &[T], s: &str) -> Result<T, String> {
    let wanted: String = s.trim().chars().filter(|c| *c != '_').collect();
    all.iter()
        .copied()
        .find(|v| format!("{v:?}").eq_ignore_ascii_case(&wanted))
        .ok_or_else(|| format!("unknown value '{s}'"))
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(&Self::ALL, s)
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(&Self::ALL, s)
    }
}

impl Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Build the activity to show. A stream without a valid url is shown as playing instead.
pub fn activity_data(kind: ActivityKind, name: &str, url: Option<&str>) -> ActivityData {
    match kind {
        ActivityKind::Playing => ActivityData::playing(name),
        ActivityKind::Streaming => match url.map(|url| ActivityData::streaming(name, url)) {
            Some(Ok(activity)) => activity,
            Some(Err(e)) => {
                tracing::warn!("Invalid stream url, showing as playing instead. {e}");
                ActivityData::playing(name)
            }
            None => {
                tracing::warn!("Streaming activity without a stream url, showing as playing instead.");
                ActivityData::playing(name)
            }
        },
        ActivityKind::Listening => ActivityData::listening(name),
        ActivityKind::Watching => ActivityData::watching(name),
        ActivityKind::Competing => ActivityData::competing(name),
        ActivityKind::Custom => ActivityData::custom(name),
    }
}
