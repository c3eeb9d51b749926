// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cross-checks of declared counts and lengths against the decoded tree.
//!
//! Every mismatch is reported on its own; none of the checks stop at the first problem.

use std::collections::BTreeSet;
use crate::usb::descriptor_tree::{DescriptorKind, DescriptorNode};
use crate::usb::errors::DecodeError;

/// Checks interface, endpoint and device capability counts of a standard descriptor tree.
pub fn check_standard_tree(tree: &[DescriptorNode], errors: &mut Vec<DecodeError>) {
    for node in tree.iter().flat_map(|root| root.walk()) {
        match node.kind {
            DescriptorKind::Configuration => check_interface_count(node, errors),
            DescriptorKind::Interface => check_endpoint_count(node, errors),
            DescriptorKind::Bos => check_device_capability_count(node, errors),
            _ => {}
        }
    }
}

fn report_count(node: &DescriptorNode, what: &'static str, expected: Option<u32>, actual: usize, errors: &mut Vec<DecodeError>) {
    // A truncated descriptor has nothing to compare against.
    let Some(expected) = expected else {
        return;
    };
    if expected as usize != actual {
        errors.push(DecodeError::CountMismatch {
            name: node.kind.name(),
            what,
            offset: node.source_offset,
            expected: expected as usize,
            actual,
        });
    }
}

/// `bNumInterfaces` counts interfaces, not alternate settings.
fn check_interface_count(configuration: &DescriptorNode, errors: &mut Vec<DecodeError>) {
    let interface_numbers: BTreeSet<Option<u32>> = configuration
        .children_of_kind(DescriptorKind::Interface)
        .map(|interface| interface.field_value("Interface Number"))
        .collect();
    report_count(
        configuration,
        "interfaces",
        configuration.field_value("Number of Interfaces"),
        interface_numbers.len(),
        errors,
    );
}

fn check_endpoint_count(interface: &DescriptorNode, errors: &mut Vec<DecodeError>) {
    report_count(
        interface,
        "endpoints",
        interface.field_value("Number of Endpoints"),
        interface.children_of_kind(DescriptorKind::Endpoint).count(),
        errors,
    );
}

fn check_device_capability_count(bos: &DescriptorNode, errors: &mut Vec<DecodeError>) {
    let actual = bos
        .children
        .iter()
        .filter(|child| matches!(child.kind, DescriptorKind::DeviceCapability(_)))
        .count();
    report_count(
        bos,
        "device capabilities",
        bos.field_value("Number of Device Capability Descriptors"),
        actual,
        errors,
    );
}

/// Number of bytes covered by a node and all of its descendants.
pub fn subtree_span(node: &DescriptorNode) -> usize {
    let end = node
        .walk()
        .map(|n| n.source_offset + n.source_length)
        .max()
        .unwrap_or(node.source_offset + node.source_length);
    end - node.source_offset
}

/// Checks the declared total lengths of the set header and of every subset of a
/// Microsoft OS 2.0 descriptor set against the bytes their subtrees cover.
pub fn check_ms_os_20_tree(tree: &[DescriptorNode], errors: &mut Vec<DecodeError>) {
    for node in tree.iter().flat_map(|root| root.walk()) {
        let declared = match node.kind {
            DescriptorKind::MsOs20SetHeader | DescriptorKind::MsOs20ConfigurationSubset =>
                node.field_value("Total Length"),
            DescriptorKind::MsOs20FunctionSubset => node.field_value("Subset Length"),
            _ => None,
        };
        let Some(declared) = declared else {
            continue;
        };
        let consumed = subtree_span(node);
        if declared as usize != consumed {
            errors.push(DecodeError::LengthMismatch {
                name: node.kind.name(),
                offset: node.source_offset,
                declared: declared as usize,
                consumed,
            });
        }
    }
}
