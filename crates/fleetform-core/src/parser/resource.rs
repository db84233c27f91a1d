//! resource / output ノードのパース

use super::value::{parse_attribute, parse_reference};
use crate::error::{DeclarationError, Result};
use crate::model::{OutputDeclaration, ResourceAddress, ResourceDeclaration};
use kdl::KdlNode;

/// resource ノードをパース
///
/// ```kdl
/// resource "aws_subnet" "public_a" {
///     vpc_id (ref)"aws_vpc.main.id"
///     cidr_block "10.0.1.0/24"
///     depends-on "aws_internet_gateway.gw"
/// }
/// ```
pub fn parse_resource(node: &KdlNode) -> Result<ResourceDeclaration> {
    let args: Vec<&str> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .collect();

    let (kind, name) = match args.as_slice() {
        [kind, name] => (*kind, *name),
        _ => {
            return Err(DeclarationError::InvalidConfig(
                "resource には種別と名前が必要です: resource \"kind\" \"name\" { ... }"
                    .to_string(),
            ));
        }
    };

    let mut resource = ResourceDeclaration::new(kind, name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "depends-on" | "depends_on" => {
                    for entry in child.entries() {
                        let text = entry.value().as_string().ok_or_else(|| {
                            DeclarationError::InvalidConfig(format!(
                                "{}.{}: depends-on には kind.name 形式の文字列を指定してください",
                                kind, name
                            ))
                        })?;
                        resource.depends_on.insert(text.parse::<ResourceAddress>()?);
                    }
                }
                attribute => {
                    let value = parse_attribute(child)?;
                    if resource.attributes.insert(attribute.to_string(), value).is_some() {
                        return Err(DeclarationError::InvalidAttribute {
                            attribute: attribute.to_string(),
                            message: format!("{}.{} で属性が重複しています", kind, name),
                        });
                    }
                }
            }
        }
    }

    resource.validate()?;
    Ok(resource)
}

/// output ノードをパース
///
/// ```kdl
/// output "lb_dns_name" (ref)"aws_lb.web.dns_name" description="公開エンドポイント"
/// ```
pub fn parse_output(node: &KdlNode) -> Result<OutputDeclaration> {
    let args: Vec<_> = node.entries().iter().filter(|e| e.name().is_none()).collect();

    let [name_entry, value_entry] = args.as_slice() else {
        return Err(DeclarationError::InvalidConfig(
            "output には名前と参照が必要です: output \"name\" (ref)\"kind.name.attr\"".to_string(),
        ));
    };

    let name = name_entry
        .value()
        .as_string()
        .ok_or_else(|| DeclarationError::InvalidConfig("output 名は文字列です".to_string()))?
        .to_string();
    let value = parse_reference(&name, value_entry)?;
    let description = node
        .entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some("description"))
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string());

    Ok(OutputDeclaration {
        name,
        value,
        description,
    })
}
