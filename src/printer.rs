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

use std::fmt;
use usb_inspector_core::{DecodeResult, DescriptorNode};

const INDENT: &str = "  ";

/// Text rendering of a decoded descriptor tree with field offsets, capabilities and errors.
pub struct TreeDisplay<'a> {
    pub title: &'a str,
    pub result: &'a DecodeResult,
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &DescriptorNode, depth: usize) -> fmt::Result {
    let indent = INDENT.repeat(depth);
    writeln!(f, "{}{} @ {} ({} bytes)", indent, node.kind, node.source_offset, node.source_length)?;
    for field in &node.fields {
        writeln!(
            f,
            "{}{}[{:>4}:{}] {}: {}",
            indent, INDENT, field.byte_offset, field.byte_size, field.label, field.formatted_value
        )?;
    }
    for capability in &node.capabilities {
        writeln!(f, "{}{}-> {}", indent, INDENT, capability.name())?;
    }
    for child in &node.children {
        write_node(f, child, depth + 1)?;
    }
    Ok(())
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} bytes)", self.title, self.result.raw_buffer.len())?;
        for node in &self.result.tree {
            write_node(f, node, 1)?;
        }
        for error in &self.result.errors {
            writeln!(f, "{}! {}", INDENT, error)?;
        }
        Ok(())
    }
}
