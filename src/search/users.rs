use std::collections::HashMap;

use crate::config::UsersConfig;

pub const BLACKLISTED_GROUP: &str = "blacklisted";
pub const PRIVILEGED_GROUP: &str = "privileged";

/// Classifies a username into a trust group
pub trait UserGroupResolver: Send + Sync {
    fn group_of(&self, username: &str) -> String;
}

/// Resolver backed by the configured group membership lists.
///
/// A user listed in several groups resolves to `blacklisted` first, then
/// `privileged`, then the alphabetically first custom group.
#[derive(Debug, Clone)]
pub struct StaticGroupResolver {
    members: HashMap<String, String>,
    default_group: String,
}

impl StaticGroupResolver {
    pub fn new(config: &UsersConfig) -> Self {
        let mut groups: Vec<(&String, &Vec<String>)> = config.groups.iter().collect();
        groups.sort_by_key(|(name, _)| (precedence(name), name.as_str()));

        let mut members = HashMap::new();
        for (group, usernames) in groups {
            for username in usernames {
                members
                    .entry(username.clone())
                    .or_insert_with(|| group.clone());
            }
        }

        Self {
            members,
            default_group: config.default_group.clone(),
        }
    }
}

fn precedence(group: &str) -> u8 {
    match group {
        BLACKLISTED_GROUP => 0,
        PRIVILEGED_GROUP => 1,
        _ => 2,
    }
}

impl UserGroupResolver for StaticGroupResolver {
    fn group_of(&self, username: &str) -> String {
        self.members
            .get(username)
            .cloned()
            .unwrap_or_else(|| self.default_group.clone())
    }
}
