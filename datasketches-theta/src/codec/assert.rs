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

use crate::codec::family::Family;
use crate::error::Error;

pub(crate) fn ensure_serial_version_is(expected: u8, actual: u8) -> Result<(), Error> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::unsupported_serial_version(
            &expected.to_string(),
            actual,
        ))
    }
}

pub(crate) fn ensure_preamble_longs_in(expected: &[u8], actual: u8) -> Result<(), Error> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(Error::invalid_preamble_longs(expected, actual))
    }
}

pub(crate) fn ensure_family_in(
    accepted: &[Family],
    actual: u8,
    name: &'static str,
) -> Result<(), Error> {
    if accepted.iter().any(|family| family.id == actual) {
        Ok(())
    } else {
        let expected = accepted
            .iter()
            .map(|family| format!("{} ({})", family.id, family.name))
            .collect::<Vec<_>>()
            .join(" or ");
        Err(Error::invalid_family(&expected, actual, name))
    }
}

pub(crate) fn ensure_seed_hash_matches(expected: u16, actual: u16) -> Result<(), Error> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::seed_hash_mismatch(expected, actual))
    }
}
