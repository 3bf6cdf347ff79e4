// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::error::Error;

/// Sketch family identified by the family byte of a serialized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Family {
    pub id: u8,
    pub name: &'static str,
}

impl Family {
    /// Hash-table update sketch using the alpha theta-reduction policy.
    pub const ALPHA: Family = Family {
        id: 1,
        name: "Alpha",
    };
    /// Hash-table update sketch using the quick-select theta-reduction policy.
    pub const QUICKSELECT: Family = Family {
        id: 2,
        name: "QuickSelect",
    };
    /// Immutable compact sketch.
    pub const COMPACT: Family = Family {
        id: 3,
        name: "Compact",
    };
    /// The compact and ordered set sketch of serial versions 1 and 2.
    ///
    /// It shares its id with [`Family::COMPACT`].
    pub const SET_SKETCH: Family = Family {
        id: 3,
        name: "SetSketch",
    };
    /// Union set operation state.
    pub const UNION: Family = Family {
        id: 4,
        name: "Union",
    };

    pub fn validate_id(&self, family_id: u8) -> Result<(), Error> {
        if family_id == self.id {
            Ok(())
        } else {
            Err(Error::invalid_family(
                &self.id.to_string(),
                family_id,
                self.name,
            ))
        }
    }
}
