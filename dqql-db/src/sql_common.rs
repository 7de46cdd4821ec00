/*
 * Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Identifiers for the tag/entity store that compiled filters run against,
//! plus utilities for turning bound query values into JSON.
use std::fmt;

use sea_query::{Alias, ColumnRef, DynIden, Iden, IntoIden};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::sea_query_extra::StaticTableRef;

/// Tables and views of the store. Every one of them lives under the tenant schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTable {
    Entity,
    EntityTag,
    TagDef,
    TagMeta,
    TagHierarchy,
    /// Precomputed `,`-bounded ancestor names per tag
    TagDefParents,
    OrgEntityPermission,
    OrgTagPermission,
    UserEntityAddPermission,
    UserEntityRevPermission,
    UserTagAddPermission,
    UserTagRevPermission,
}

impl StoreTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreTable::Entity => "entity",
            StoreTable::EntityTag => "entity_tag",
            StoreTable::TagDef => "tag_def",
            StoreTable::TagMeta => "tag_meta",
            StoreTable::TagHierarchy => "tag_hierarchy",
            StoreTable::TagDefParents => "tag_def_parents",
            StoreTable::OrgEntityPermission => "org_entity_permission",
            StoreTable::OrgTagPermission => "org_tag_permission",
            StoreTable::UserEntityAddPermission => "user_entity_add_permission",
            StoreTable::UserEntityRevPermission => "user_entity_rev_permission",
            StoreTable::UserTagAddPermission => "user_tag_add_permission",
            StoreTable::UserTagRevPermission => "user_tag_rev_permission",
        }
    }
}

impl Iden for StoreTable {
    fn unquoted(&self, s: &mut dyn fmt::Write) {
        write!(s, "{}", self.as_str()).unwrap();
    }
}

/// Columns referenced by compiled filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Col {
    Id,
    EntityId,
    TagId,
    Name,
    ChildId,
    ParentId,
    ParentIds,
    Attribute,
    Value,
    OrgId,
    UserId,
    DisabledTs,
    ValueN,
    ValueB,
    ValueS,
    ValueTs,
    ValueRef,
    ValueEnum,
}

impl Col {
    pub fn as_str(&self) -> &'static str {
        match self {
            Col::Id => "id",
            Col::EntityId => "entity_id",
            Col::TagId => "tag_id",
            Col::Name => "name",
            Col::ChildId => "child_id",
            Col::ParentId => "parent_id",
            Col::ParentIds => "parent_ids",
            Col::Attribute => "attribute",
            Col::Value => "value",
            Col::OrgId => "org_id",
            Col::UserId => "user_id",
            Col::DisabledTs => "disabled_ts",
            Col::ValueN => "value_n",
            Col::ValueB => "value_b",
            Col::ValueS => "value_s",
            Col::ValueTs => "value_ts",
            Col::ValueRef => "value_ref",
            Col::ValueEnum => "value_enum",
        }
    }
}

impl Iden for Col {
    fn unquoted(&self, s: &mut dyn fmt::Write) {
        write!(s, "{}", self.as_str()).unwrap();
    }
}

/// The fact columns a projection groups by: every `entity_tag` column except
/// the row id, the owning entity, the structured list/dict slots and the soft-delete stamp.
pub const FACT_COLUMNS: [Col; 7] = [
    Col::TagId,
    Col::ValueN,
    Col::ValueB,
    Col::ValueS,
    Col::ValueTs,
    Col::ValueRef,
    Col::ValueEnum,
];

/// Database schema (namespace) qualifying every table of one deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DbSchema(SmolStr);

impl DbSchema {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        DbSchema(name.into())
    }

    pub fn name(&self) -> &str {
        self.0.as_str()
    }

    /// Schema-qualified reference to a store table
    pub fn table(&self, table: StoreTable) -> StaticTableRef {
        StaticTableRef::SchemaTable(Alias::new(self.0.as_str()).into_iden(), table.into_iden())
    }
}

impl Default for DbSchema {
    fn default() -> Self {
        DbSchema::new("core")
    }
}

impl fmt::Display for DbSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shorthand for `alias.col`
pub fn col_of(alias: &DynIden, col: Col) -> ColumnRef {
    ColumnRef::TableColumn(alias.clone(), col.into_iden())
}

/// Given a bound query value, convert it to a JSON value.
/// Only the value kinds a compiled filter binds are represented; anything else becomes null.
pub fn value_to_json_value(v: &sea_query::Value) -> serde_json::Value {
    match v {
        sea_query::Value::Bool(Some(b)) => (*b).into(),
        sea_query::Value::Int(Some(i)) => (*i).into(),
        sea_query::Value::BigInt(Some(i)) => (*i).into(),
        sea_query::Value::Double(Some(d)) => (*d).into(),
        sea_query::Value::String(Some(s)) => s.as_str().into(),
        _ => serde_json::Value::Null,
    }
}

/// Convert all values of a built query, in placeholder order
pub fn values_to_json(values: &sea_query::Values) -> serde_json::Value {
    values.0.iter().map(value_to_json_value).collect()
}
