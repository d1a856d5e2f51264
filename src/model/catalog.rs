//! The location and position catalogs.
//!
//! Both catalogs have grown by appending values over time, and older records can carry names that
//! are no longer offered. They are therefore open sets: a name that is not in the catalog is kept
//! verbatim as `Other` instead of being rejected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Where a transaction happened, i.e. the property or account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Hollgasse11,
    Hollgasse154,
    Stipcakgasse8,
    Personal,
    Other(String),
}

impl Default for Location {
    fn default() -> Self {
        Location::Hollgasse11
    }
}

const LOCATIONS: &[(Location, &str, &str)] = &[
    (Location::Hollgasse11, "Hollgasse 1/1", "Hollgasse_1_1"),
    (Location::Hollgasse154, "Hollgasse 1/54", "Hollgasse_1_54"),
    (Location::Stipcakgasse8, "Stipcakgasse 8", "Stipcakgasse_8"),
    (Location::Personal, "Personal", "Personal"),
];

impl Location {
    /// The known locations, in the order they are offered.
    pub fn known() -> Vec<Location> {
        LOCATIONS.iter().map(|(l, _, _)| l.clone()).collect()
    }

    pub fn display_name(&self) -> &str {
        match self {
            Location::Other(name) => name.as_str(),
            known => LOCATIONS
                .iter()
                .find(|(l, _, _)| l == known)
                .map(|(_, display, _)| *display)
                .unwrap_or_default(),
        }
    }
}

impl FromStr for Location {
    type Err = Infallible;

    /// Looks up by display name first, then by the legacy identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let found = LOCATIONS
            .iter()
            .find(|(_, display, _)| *display == s)
            .or_else(|| LOCATIONS.iter().find(|(_, _, ident)| *ident == s))
            .map(|(l, _, _)| l.clone());
        Ok(found.unwrap_or_else(|| Location::Other(s.to_string())))
    }
}

/// The group a position belongs to, which decides at which locations it is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionGroup {
    Rental,
    Garage,
    Personal,
}

serde_plain::derive_display_from_serialize!(PositionGroup);
serde_plain::derive_fromstr_from_deserialize!(PositionGroup);

/// The category label of a transaction, e.g. `Essen` or `Internet`.
///
/// Known positions are stored by their display name, anything else is `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Position {
    Known(&'static str),
    Other(String),
}

/// (display name, legacy identifier, group)
const POSITIONS: &[(&str, &str, PositionGroup)] = &[
    ("Haushaltsversicherung", "haushaltsversicherung", PositionGroup::Rental),
    ("Hausverwaltung", "hausverwaltung", PositionGroup::Rental),
    ("Internet", "internet", PositionGroup::Rental),
    ("Klimaanlage", "klimaanlage", PositionGroup::Rental),
    ("Mieteinkommen", "mieteinkommen", PositionGroup::Rental),
    ("OBS Haushaltsabgabe", "obs_haushaltsabgabe", PositionGroup::Rental),
    ("Rechtsschutzversicherung", "rechtsschutzversicherung", PositionGroup::Rental),
    ("Strom", "strom", PositionGroup::Rental),
    ("Wasser/Heizung", "wasser_heizung", PositionGroup::Rental),
    ("Garage A1/12", "garage_a1_12", PositionGroup::Garage),
    ("Garage A3/17", "garage_a3_17", PositionGroup::Garage),
    ("Reparaturrücklage A1/12", "reparaturruecklage_garage_a1_12", PositionGroup::Garage),
    ("Reparaturrücklage A3/17", "reparaturruecklage_garage_a3_17", PositionGroup::Garage),
    ("Betriebskosten A1/12", "betriebskosten_garage_a1_12", PositionGroup::Garage),
    ("Betriebskosten A3/17", "betriebskosten_garage_a3_17", PositionGroup::Garage),
    ("Auto", "auto", PositionGroup::Personal),
    ("Arbeitssuche", "arbeitssuche", PositionGroup::Personal),
    ("Bank", "bank", PositionGroup::Personal),
    ("Betriebsratsumlage", "betriebsratsumlage", PositionGroup::Personal),
    ("Digitale Arbeitsmittel", "digitale_arbeitsmittel", PositionGroup::Personal),
    ("Essen", "essen", PositionGroup::Personal),
    ("Gehalt", "gehalt", PositionGroup::Personal),
    ("Gesundheit", "gesundheit", PositionGroup::Personal),
    ("Homeoffice", "homeoffice", PositionGroup::Personal),
    ("Kammer", "kammer", PositionGroup::Personal),
    ("Kleinmaterial", "kleinmaterial", PositionGroup::Personal),
    ("Kurse", "kurse", PositionGroup::Personal),
    ("Fachliteratur", "fachliteratur", PositionGroup::Personal),
    ("Medizin", "medizin", PositionGroup::Personal),
    ("Sonderausgaben", "sonderausgaben", PositionGroup::Personal),
    ("Steuerberater", "steuerberater", PositionGroup::Personal),
    ("Telefon", "telefon", PositionGroup::Personal),
    ("Verkehrsmittel", "verkehrsmittel", PositionGroup::Personal),
    ("Versicherung", "versicherung", PositionGroup::Personal),
    ("Zusatzpension", "zusatzpension", PositionGroup::Personal),
];

impl Default for Position {
    fn default() -> Self {
        Position::Known("Essen")
    }
}

impl Position {
    pub fn display_name(&self) -> &str {
        match self {
            Position::Known(name) => *name,
            Position::Other(name) => name.as_str(),
        }
    }

    /// The group of a known position, `None` for positions outside the catalog.
    pub fn group(&self) -> Option<PositionGroup> {
        match self {
            Position::Known(name) => POSITIONS
                .iter()
                .find(|(display, _, _)| display == name)
                .map(|(_, _, group)| *group),
            Position::Other(_) => None,
        }
    }

    pub fn in_group(group: PositionGroup) -> Vec<Position> {
        POSITIONS
            .iter()
            .filter(|(_, _, g)| *g == group)
            .map(|(display, _, _)| Position::Known(*display))
            .collect()
    }

    /// The positions offered on the entry form once `location` is selected.
    pub fn for_location(location: &Location) -> Vec<Position> {
        match location {
            Location::Hollgasse11 | Location::Hollgasse154 => Self::in_group(PositionGroup::Rental),
            Location::Stipcakgasse8 => {
                let mut positions = Self::in_group(PositionGroup::Garage);
                positions.push(Position::Known("Mieteinkommen"));
                positions
            }
            Location::Personal => Self::in_group(PositionGroup::Personal),
            Location::Other(_) => POSITIONS
                .iter()
                .map(|(display, _, _)| Position::Known(*display))
                .collect(),
        }
    }
}

impl FromStr for Position {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let found = POSITIONS
            .iter()
            .find(|(display, _, _)| *display == s)
            .or_else(|| POSITIONS.iter().find(|(_, ident, _)| *ident == s))
            .map(|(display, _, _)| Position::Known(*display));
        Ok(found.unwrap_or_else(|| Position::Other(s.to_string())))
    }
}

/// Which tax report an entry is exported to. `Auto` lets the backend decide from the location.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportTo {
    #[default]
    Auto,
    Hollgasse,
    Arbeitnehmerveranlagung,
    Both,
    None,
}

serde_plain::derive_display_from_serialize!(ExportTo);
serde_plain::derive_fromstr_from_deserialize!(ExportTo);

impl ExportTo {
    pub fn display_name(&self) -> &'static str {
        match self {
            ExportTo::Auto => "Auto",
            ExportTo::Hollgasse => "Hollgasse",
            ExportTo::Arbeitnehmerveranlagung => "Arbeitnehmerveranlagung",
            ExportTo::Both => "Both",
            ExportTo::None => "None",
        }
    }
}

macro_rules! string_serde {
    ($t:ty) => {
        impl Display for $t {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.display_name())
            }
        }

        impl Serialize for $t {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(self.display_name())
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Ok(<$t>::from_str(&s).unwrap_or_else(|never| match never {}))
            }
        }
    };
}

string_serde!(Location);
string_serde!(Position);
