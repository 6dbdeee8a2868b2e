//! Parses nmap output, XML or plain text, into open-port records.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::error::ParseError;

/// One open port as reported by nmap, ready to feed `ReconTree::add_port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmapPort {
    pub port: u16,
    pub service: String,
    pub banner: String,
}

static PLAIN_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)/(tcp|udp)\s+open\s+(\S+)\s*(.*)$").unwrap());

/// Parses `nmap -oX -` XML output. Only ports with `state="open"` are kept;
/// the banner is `product version` joined from the `service` element's
/// attributes, falling back to empty.
pub fn parse_xml(xml: &str) -> Result<Vec<NmapPort>, ParseError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| ParseError::NmapXml(e.to_string()))?;

    let mut ports = Vec::new();
    for port_node in doc.descendants().filter(|n| n.has_tag_name("port")) {
        let is_open = port_node
            .children()
            .find(|n| n.has_tag_name("state"))
            .and_then(|n| n.attribute("state"))
            == Some("open");
        if !is_open {
            continue;
        }
        let Some(port_num) = port_node.attribute("portid").and_then(|s| s.parse::<u16>().ok())
        else {
            continue;
        };

        let service_node = port_node.children().find(|n| n.has_tag_name("service"));
        let service = service_node
            .and_then(|n| n.attribute("name"))
            .unwrap_or("unknown")
            .to_string();
        let banner = service_node
            .map(|n| {
                let product = n.attribute("product").unwrap_or("");
                let version = n.attribute("version").unwrap_or("");
                [product, version]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        ports.push(NmapPort {
            port: port_num,
            service,
            banner,
        });
    }
    Ok(ports)
}

/// Parses `^(\d+)/(tcp|udp)\s+open\s+(\S+)\s*(.*)$` lines from plain-text
/// nmap output (the format `-oN` or the default console output uses).
pub fn parse_text(text: &str) -> Vec<NmapPort> {
    text.lines()
        .filter_map(|line| {
            let caps = PLAIN_LINE.captures(line.trim())?;
            let port = caps.get(1)?.as_str().parse::<u16>().ok()?;
            let service = caps.get(3)?.as_str().to_string();
            let banner = caps.get(4).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
            Some(NmapPort { port, service, banner })
        })
        .collect()
}

/// `true` if the command names nmap and the output looks like nmap XML.
pub fn is_xml_output(output: &str) -> bool {
    output.contains("<nmaprun")
}
