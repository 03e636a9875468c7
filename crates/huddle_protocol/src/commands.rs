#![forbid(unsafe_code)]

//! Command names and argument records of the backend request/response bridge.
//!
//! Argument keys use the bridge's camelCase convention (`groupId`, `packageId`); byte payloads
//! travel as JSON arrays of numbers.

use huddle_domain::{GroupId, PackageId, UserName};
use serde::{Deserialize, Serialize};

pub const CREATE_USER: &str = "create_user";
pub const IS_AUTHENTICATED: &str = "is_authenticated";
pub const GET_IDENTITY: &str = "get_identity";
pub const GET_GROUPS: &str = "get_groups";
pub const CREATE_GROUP: &str = "create_group";
pub const ADVERTISE: &str = "advertise";
pub const INVITE_PACKAGE: &str = "invite_package";
pub const CREATE_MESSAGE: &str = "create_message";
pub const PROCESS_MESSAGE: &str = "process_message";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserArgs {
	pub name: UserName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePackageArgs {
	pub group_id: GroupId,
	pub package_id: PackageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageArgs {
	pub group_id: GroupId,
	pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMessageArgs {
	pub data: Vec<u8>,
}
