// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::descriptor::{MethodDescriptor, ParamRole};
use crate::error::{Error, InvalidArgumentsSnafu, InvalidConfigurationSnafu};
use crate::types::{Argument, Arguments, HttpParameterSet};
use std::collections::{BTreeMap, HashSet};
use surf::http::Method;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot { name: String, arg: usize },
}

/// Maps the arguments of one method to a request.
///
/// Bound once per method when its service is built. The template is parsed and checked against
/// the parameter roles at that point, so [FunctionWorker::build] does no lookups by name.
#[derive(Clone, Debug)]
pub struct FunctionWorker {
    name: String,
    method: Method,
    segments: Vec<Segment>,
    roles: Vec<ParamRole>,
    headers: Vec<(String, String)>,
}

impl FunctionWorker {
    pub fn bind(descriptor: &MethodDescriptor) -> Result<Self, Error> {
        let name = descriptor.name();
        let roles = descriptor.params().to_vec();
        let misconfigured = |message: String| {
            InvalidConfigurationSnafu {
                message: format!("method {}: {}", name, message),
            }
            .fail()
        };

        let mut path_args = BTreeMap::new();
        let mut queries = HashSet::new();
        let mut headers = HashSet::new();
        let mut bodies = 0;
        for (arg, role) in roles.iter().enumerate() {
            let fresh = match role {
                ParamRole::Path(slot) => path_args.insert(slot.as_str(), arg).is_none(),
                ParamRole::Query(key) => queries.insert(key.as_str()),
                ParamRole::Header(key) => headers.insert(key.to_ascii_lowercase()),
                ParamRole::Body => {
                    bodies += 1;
                    bodies == 1
                }
            };
            if !fresh {
                return misconfigured(format!("parameter {:?} is declared twice", role));
            }
        }

        let segments = parse_template(descriptor.path())
            .map_err(|message| Error::InvalidConfiguration {
                message: format!("method {}: {}", name, message),
            })?
            .into_iter()
            .map(|segment| match segment {
                Template::Literal(text) => Ok(Segment::Literal(text)),
                Template::Slot(slot) => match path_args.get(slot.as_str()) {
                    Some(&arg) => Ok(Segment::Slot { name: slot, arg }),
                    None => Err(slot),
                },
            })
            .collect::<Result<Vec<_>, _>>();
        let segments = match segments {
            Ok(segments) => segments,
            Err(slot) => {
                return misconfigured(format!("path slot {{{}}} has no path parameter", slot))
            }
        };
        for slot in path_args.keys() {
            let used = segments
                .iter()
                .any(|segment| matches!(segment, Segment::Slot { name, .. } if name == slot));
            if !used {
                return misconfigured(format!(
                    "path parameter {} does not appear in {}",
                    slot,
                    descriptor.path()
                ));
            }
        }

        Ok(Self {
            name: name.to_string(),
            method: descriptor.method().clone(),
            segments,
            roles,
            headers: descriptor
                .headers()
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
                .collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the request for one call. Pure: the same arguments always give the same request.
    pub fn build(&self, args: &Arguments) -> Result<HttpParameterSet, Error> {
        if args.len() != self.roles.len() {
            return self.invalid(format!(
                "expected {} arguments, got {}",
                self.roles.len(),
                args.len()
            ));
        }

        let mut path = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Slot { name, arg } => match args.get(*arg) {
                    Some(Argument::Text(value)) => path.push_str(&urlencoding::encode(value)),
                    _ => return self.invalid(format!("path parameter {} needs a value", name)),
                },
            }
        }

        let mut query = BTreeMap::new();
        let mut headers = self.headers.iter().cloned().collect::<BTreeMap<_, _>>();
        let mut body = None;
        for (role, arg) in self.roles.iter().zip(args.iter()) {
            match (role, arg) {
                (ParamRole::Path(_), _) => {}
                (ParamRole::Query(key), Argument::Text(value)) => {
                    query.insert(key.clone(), value.clone());
                }
                (ParamRole::Header(key), Argument::Text(value)) => {
                    headers.insert(key.to_ascii_lowercase(), value.clone());
                }
                (ParamRole::Query(_), Argument::Absent)
                | (ParamRole::Header(_), Argument::Absent)
                | (ParamRole::Body, Argument::Absent) => {}
                (ParamRole::Body, Argument::Body(payload)) => body = Some(payload.clone()),
                (role, _) => {
                    return self.invalid(format!("argument for {:?} has the wrong kind", role))
                }
            }
        }

        Ok(HttpParameterSet {
            method: self.method.clone(),
            path,
            query,
            headers,
            body,
        })
    }

    fn invalid<T>(&self, message: String) -> Result<T, Error> {
        InvalidArgumentsSnafu {
            method: self.name.clone(),
            message,
        }
        .fail()
    }
}

enum Template {
    Literal(String),
    Slot(String),
}

fn parse_template(template: &str) -> Result<Vec<Template>, String> {
    let mut parts = Vec::new();
    let mut rest = template;
    while !rest.is_empty() {
        match rest.find(|c: char| c == '{' || c == '}') {
            None => {
                parts.push(Template::Literal(rest.to_string()));
                break;
            }
            Some(start) if rest[start..].starts_with('}') => {
                return Err(format!("unmatched }} in {}", template));
            }
            Some(start) => {
                if start > 0 {
                    parts.push(Template::Literal(rest[..start].to_string()));
                }
                let end = match rest[start..].find('}') {
                    Some(end) => start + end,
                    None => return Err(format!("unterminated {{ in {}", template)),
                };
                let slot = &rest[start + 1..end];
                if slot.is_empty() || slot.contains('{') {
                    return Err(format!("malformed slot {{{}}} in {}", slot, template));
                }
                parts.push(Template::Slot(slot.to_string()));
                rest = &rest[end + 1..];
            }
        }
    }
    Ok(parts)
}
