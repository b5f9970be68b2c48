/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::Display,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use chrono_tz::Tz;

use crate::{
    error::{Error, Result},
    key::{md5_hash, SerialHash},
};

const FIELD_SEPARATOR: char = ';';

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum GroupType {
    Area,
    Set,
    Commons,
    Segment,
    Utility,
}

/// Meters aggregated together, in the order they were listed. Members and
/// serials are aligned by index.
#[derive(Clone, Debug)]
pub struct Group {
    group_type: GroupType,
    key: String,
    timezone: Tz,
    members: Vec<SerialHash>,
    serials: Vec<String>,
    index: HashMap<SerialHash, usize>,
}

#[derive(Clone, Copy, Debug)]
struct Membership {
    group: usize,
    member: usize,
}

/// Groups by composite key (group key followed by area key), with a
/// reverse index from serial hash to the groups containing the meter.
#[derive(Default, Debug)]
pub struct GroupDirectory {
    groups: Vec<Group>,
    by_key: HashMap<String, usize>,
    by_member: HashMap<SerialHash, Vec<Membership>>,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct User {
    pub account_key: String,
    pub display_name: String,
}

#[derive(Default, Debug)]
pub struct UserDirectory(HashMap<String, User>);

impl Group {
    fn new(group_type: GroupType, key: String, timezone: Tz) -> Self {
        Self {
            group_type,
            key,
            timezone,
            members: Vec::new(),
            serials: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Appends a member; returns its index if this is the first
    /// occurrence of the meter in the group.
    fn push(&mut self, serial: String, hash: SerialHash) -> Option<usize> {
        let member = self.members.len();
        self.members.push(hash);
        self.serials.push(serial);
        match self.index.entry(hash) {
            Entry::Occupied(_) => None,
            Entry::Vacant(ent) => {
                ent.insert(member);
                Some(member)
            }
        }
    }

    pub fn group_type(&self) -> GroupType {
        self.group_type
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn index_of(&self, hash: &SerialHash) -> Option<usize> {
        self.index.get(hash).copied()
    }

    pub fn contains(&self, hash: &SerialHash) -> bool {
        self.index.contains_key(hash)
    }

    pub fn serial(&self, member: usize) -> Option<&str> {
        self.serials.get(member).map(String::as_str)
    }

    pub fn members(&self) -> impl Iterator<Item = (&SerialHash, &str)> {
        self.members
            .iter()
            .zip(self.serials.iter().map(String::as_str))
    }
}

impl GroupDirectory {
    /// Load a group membership feed: `type;groupKey;areaKey;serial;timezone`.
    pub fn load(path: &Path) -> Result<Self> {
        let dir = Self::parse(open(path)?).map_err(|e| with_path(e, path))?;
        log::debug!("loaded {} groups from {}", dir.len(), path.display());
        Ok(dir)
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut dir = Self::default();
        for_records(reader, 5, |line, fields| {
            let group_type = fields[0].parse()?;
            let timezone = fields[4]
                .parse::<Tz>()
                .map_err(|_| Error::UnknownTimezone(line, fields[4].to_string()))?;
            dir.insert(
                group_type,
                format!("{}{}", fields[1], fields[2]),
                fields[3].to_string(),
                timezone,
            );
            Ok(())
        })?;
        Ok(dir)
    }

    fn insert(&mut self, group_type: GroupType, key: String, serial: String, timezone: Tz) {
        let group = match self.by_key.get(&key) {
            Some(group) => *group,
            None => {
                let group = self.groups.len();
                self.by_key.insert(key.clone(), group);
                self.groups.push(Group::new(group_type, key, timezone));
                group
            }
        };
        let hash = md5_hash(&serial);
        if let Some(member) = self.groups[group].push(serial, hash) {
            self.by_member
                .entry(hash)
                .or_default()
                .push(Membership { group, member });
        }
    }

    pub fn get(&self, key: &str) -> Option<&Group> {
        self.by_key.get(key).map(|i| &self.groups[*i])
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// Groups containing the meter, with the meter's index in each.
    pub fn memberships<'a>(
        &'a self,
        hash: &SerialHash,
    ) -> impl Iterator<Item = (usize, &'a Group, usize)> + 'a {
        self.by_member
            .get(hash)
            .into_iter()
            .flatten()
            .map(|m| (m.group, &self.groups[m.group], m.member))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl UserDirectory {
    /// Load a user feed: `serial;accountKey;displayName`. Later records
    /// replace earlier ones for the same serial.
    pub fn load(path: &Path) -> Result<Self> {
        let dir = Self::parse(open(path)?).map_err(|e| with_path(e, path))?;
        log::debug!("loaded {} users from {}", dir.len(), path.display());
        Ok(dir)
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut users = HashMap::new();
        for_records(reader, 3, |_, fields| {
            users.insert(
                fields[0].to_string(),
                User {
                    account_key: fields[1].to_string(),
                    display_name: fields[2].to_string(),
                },
            );
            Ok(())
        })?;
        Ok(Self(users))
    }

    pub fn get(&self, serial: &str) -> Option<&User> {
        self.0.get(serial)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::MissingDirectoryFile(path.to_path_buf()))
        }
        Err(e) => Err(Error::ReadDirectoryFile(path.to_path_buf(), e)),
    }
}

/// Read errors from `parse` carry no path; attach it here.
fn with_path(e: Error, path: &Path) -> Error {
    match e {
        Error::ReadDirectoryFile(_, e) => Error::ReadDirectoryFile(path.to_path_buf(), e),
        e => e,
    }
}

/// Calls `f` with the 1-based line number and the fields of every
/// non-blank line. Fields beyond `required` are passed through unchecked.
fn for_records<R, F>(reader: R, required: usize, mut f: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(usize, &[&str]) -> Result<()>,
{
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::ReadDirectoryFile(Default::default(), e))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = line.split(FIELD_SEPARATOR).collect::<Vec<_>>();
        if fields.len() < required {
            return Err(Error::MalformedRecord {
                line: i + 1,
                expected: required,
                found: fields.len(),
            });
        }
        f(i + 1, &fields)?;
    }
    Ok(())
}

impl Display for GroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupType::Area => write!(f, "AREA"),
            GroupType::Set => write!(f, "SET"),
            GroupType::Commons => write!(f, "COMMONS"),
            GroupType::Segment => write!(f, "SEGMENT"),
            GroupType::Utility => write!(f, "UTILITY"),
        }
    }
}

impl FromStr for GroupType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        [
            GroupType::Area,
            GroupType::Set,
            GroupType::Commons,
            GroupType::Segment,
            GroupType::Utility,
        ]
        .into_iter()
        .find(|t| t.to_string().eq_ignore_ascii_case(s))
        .ok_or_else(|| Error::UnsupportedGroupType(s.to_string()))
    }
}
