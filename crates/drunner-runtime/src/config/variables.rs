//! Mapa de variáveis com chaves case-insensitive e substituição de `$VAR`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapa chave/valor. A chave guarda a grafia original, mas buscas ignoram caixa.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables {
    entries: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_key(&self, key: &str) -> Option<&String> {
        self.entries.keys().find(|k| k.eq_ignore_ascii_case(key))
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.find_key(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.find_key(key)
            .and_then(|k| self.entries.get(k))
            .map(String::as_str)
    }

    /// Grava o valor, reaproveitando a grafia de uma chave já existente.
    pub fn set(&mut self, key: &str, value: &str) {
        let stored = self
            .find_key(key)
            .cloned()
            .unwrap_or_else(|| key.to_string());
        self.entries.insert(stored, value.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        if let Some(k) = self.find_key(key).cloned() {
            self.entries.remove(&k);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Troca `${KEY}` e `$KEY` pelos valores conhecidos.
    ///
    /// Tokens desconhecidos ficam intactos, para que uma segunda passada (com
    /// outro mapa) possa resolvê-los. Em `$KEY` sem chaves vale o maior nome
    /// conhecido que prefixa o identificador: `$SERVICENAME_data` vira
    /// `myapp_data`.
    pub fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(braced) = after.strip_prefix('{') {
                if let Some(end) = braced.find('}') {
                    let name = &braced[..end];
                    if let Some(value) = self.get(name) {
                        out.push_str(value);
                        rest = &braced[end + 1..];
                        continue;
                    }
                }
                out.push('$');
                rest = after;
                continue;
            }

            let ident_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            let ident = &after[..ident_len];

            let best = self
                .entries
                .iter()
                .filter(|(k, _)| {
                    !k.is_empty()
                        && ident.len() >= k.len()
                        && ident.is_char_boundary(k.len())
                        && ident[..k.len()].eq_ignore_ascii_case(k)
                })
                .max_by_key(|(k, _)| k.len());

            match best {
                Some((k, v)) => {
                    out.push_str(v);
                    rest = &after[k.len()..];
                }
                None => {
                    out.push('$');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}
