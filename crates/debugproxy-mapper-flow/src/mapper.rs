use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use debugproxy_config::Config;
use debugproxy_dbgp::{decode_frame, encode_frame};
use debugproxy_mapper::{PathMapper, PathMapping, Result};
use regex::bytes::{Captures, Regex};

use crate::class_path::{read_proxy_origin, resolve_class_path, ClassIdentity, ClassPath, ProxyClassPath};

const TARGET: &str = "debugproxy.mapper.flow";

fn xml_file_attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?P<attr>fileuri|filename)="file://(?P<path>[^"]+)""#)
            .expect("xml file attribute regex is valid")
    })
}

fn text_file_argument() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"file://(?P<path>/[^\s\x00"]+)"#).expect("file argument regex is valid")
    })
}

/// Translates between the debugger's and the IDE's layout of a Flow project.
///
/// Debugger messages name either compiled proxy classes or package sources;
/// both are reduced to a [`ClassIdentity`] and resolved below the local root.
/// IDE commands go the other way, preferring paths learned from debugger
/// traffic and otherwise targeting the proxy class Flow actually executes.
pub struct FlowPathMapper {
    config: Arc<Config>,
    span: tracing::Span,
    mapping: Arc<PathMapping>,
}

impl FlowPathMapper {
    pub fn new() -> Self {
        Self {
            config: Arc::default(),
            span: tracing::Span::none(),
            mapping: Arc::default(),
        }
    }

    /// Local path for a file reported by the debugger, if it needs rewriting.
    pub fn map_remote_path(&self, remote: &str) -> Option<String> {
        if let Some(local) = self.mapping.get(remote) {
            return Some(local);
        }

        let local = self.resolve_remote_path(remote)?;
        if local == remote {
            return None;
        }
        tracing::debug!(target: TARGET, parent: &self.span, remote, local = %local, "mapped debugger path");
        self.mapping.set(remote, local.clone());
        Some(local)
    }

    /// Remote path for a file named by the IDE, if it needs rewriting.
    pub fn map_local_path(&self, local: &str) -> Option<String> {
        if let Some(remote) = self.mapping.reverse_get(local) {
            return Some(remote);
        }

        let class_path = ClassPath::parse(local).ok()?;
        let local_root = match self.config.local_root() {
            Some(root) if is_under(local, root) => root.to_owned(),
            Some(_) => return None,
            None => class_path.base_path.clone(),
        };
        let remote_root = self
            .mapping
            .remote_root()
            .unwrap_or_else(|| local_root.clone());

        let proxy = ProxyClassPath::relative(&self.config.context, &class_path.identity);
        let remote = if Path::new(&local_root).join(&proxy).is_file() {
            format!("{}/{proxy}", remote_root.trim_end_matches('/'))
        } else if remote_root != local_root {
            rebase(local, &local_root, &remote_root)
        } else {
            return None;
        };

        tracing::debug!(target: TARGET, parent: &self.span, local, remote = %remote, "mapped IDE path");
        self.mapping.set(remote.clone(), local);
        Some(remote)
    }

    fn resolve_remote_path(&self, remote: &str) -> Option<String> {
        if let Some(proxy) = ProxyClassPath::parse(remote) {
            self.remember_remote_root(&proxy.base_path);
            let local_root = self.local_root_or(&proxy.base_path);

            let local_proxy = rebase(remote, &proxy.base_path, local_root);
            if let Some(origin) = read_proxy_origin(Path::new(&local_proxy)) {
                let found = ClassPath::parse(&origin)
                    .ok()
                    .and_then(|origin| self.locate_class(local_root, &origin.identity));
                if found.is_some() {
                    return found;
                }
                let rebased = rebase(&origin, &proxy.base_path, local_root);
                if Path::new(&rebased).is_file() {
                    return Some(rebased);
                }
            }
            return self.locate_class(local_root, &proxy.identity);
        }

        let class_path = ClassPath::parse(remote).ok()?;
        self.remember_remote_root(&class_path.base_path);
        let local_root = self.local_root_or(&class_path.base_path);
        self.locate_class(local_root, &class_path.identity)
            .or_else(|| {
                (local_root != class_path.base_path)
                    .then(|| rebase(remote, &class_path.base_path, local_root))
            })
    }

    fn locate_class(&self, root: &str, identity: &ClassIdentity) -> Option<String> {
        if let Some(known) = self.mapping.class_path(root, identity.as_str()) {
            return known;
        }

        let found = resolve_class_path(Path::new(root), identity)
            .map(|path| path.to_string_lossy().into_owned());
        if found.is_none() {
            tracing::debug!(target: TARGET, parent: &self.span, root, %identity, "class not found below local root");
        }
        self.mapping.set_class_path(root, identity.as_str(), found.clone());
        found
    }

    fn local_root_or<'a>(&'a self, remote_base: &'a str) -> &'a str {
        self.config.local_root().unwrap_or(remote_base)
    }

    fn remember_remote_root(&self, root: &str) {
        if self.mapping.set_remote_root(root) {
            tracing::debug!(target: TARGET, parent: &self.span, root, "debugger project root");
        }
    }

    fn rewrite_xml<'a>(&self, payload: &'a [u8]) -> Cow<'a, [u8]> {
        xml_file_attribute().replace_all(payload, |caps: &Captures<'_>| {
            let original = caps[0].to_vec();
            let Ok(path) = std::str::from_utf8(&caps["path"]) else {
                return original;
            };
            match self.map_remote_path(&unescape_attribute(path)) {
                Some(local) => {
                    let mut out = caps["attr"].to_vec();
                    out.extend_from_slice(b"=\"file://");
                    out.extend_from_slice(escape_attribute(&local).as_bytes());
                    out.push(b'"');
                    out
                }
                None => original,
            }
        })
    }

    fn rewrite_text<'a>(&self, message: &'a [u8]) -> Cow<'a, [u8]> {
        text_file_argument().replace_all(message, |caps: &Captures<'_>| {
            let original = caps[0].to_vec();
            let Ok(path) = std::str::from_utf8(&caps["path"]) else {
                return original;
            };
            match self.map_local_path(path) {
                Some(remote) => format!("file://{remote}").into_bytes(),
                None => original,
            }
        })
    }
}

impl Default for FlowPathMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl PathMapper for FlowPathMapper {
    fn initialize(&mut self, config: Arc<Config>, span: tracing::Span, mapping: Arc<PathMapping>) {
        self.config = config;
        self.span = span;
        self.mapping = mapping;
    }

    fn apply_mapping_to_text_protocol(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        let rewritten = match self.rewrite_text(&message) {
            Cow::Borrowed(_) => None,
            Cow::Owned(rewritten) => Some(rewritten),
        };
        Ok(rewritten.unwrap_or(message))
    }

    fn apply_mapping_to_xml(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        let payload = decode_frame(&message)?;
        let reframed = match self.rewrite_xml(payload) {
            Cow::Borrowed(_) => None,
            Cow::Owned(rewritten) => Some(encode_frame(&rewritten)),
        };
        Ok(reframed.unwrap_or(message))
    }
}

/// Decode the predefined XML entities of an attribute value.
fn unescape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ]
        .into_iter()
        .find(|(entity, _)| rest.starts_with(entity));
        match decoded {
            Some((entity, ch)) => {
                out.push(ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Encode a value for a double quoted XML attribute.
fn escape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

fn is_under(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    path.strip_prefix(root)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Replace the `from` prefix of `path` with `to`; other paths come back unchanged.
fn rebase(path: &str, from: &str, to: &str) -> String {
    let from = from.trim_end_matches('/');
    let to = to.trim_end_matches('/');
    match path.strip_prefix(from) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{to}{rest}"),
        _ => path.to_owned(),
    }
}
