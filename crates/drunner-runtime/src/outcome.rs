//! Resultado tri-estado das operações (sucesso, erro, sem mudanças)

use std::fmt;
use std::ops::{Add, AddAssign};

/// Resultado agregável de uma operação.
///
/// A soma de dois resultados segue a regra: erro domina, sucesso vence
/// "sem mudanças", e `NoChange` é o elemento neutro. Mensagens de erro são
/// concatenadas, então uma operação com vários passos relata todas as falhas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Outcome {
    Success,
    #[default]
    NoChange,
    Error(String),
}

impl Outcome {
    pub fn error(msg: impl Into<String>) -> Self {
        Outcome::Error(msg.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn is_no_change(&self) -> bool {
        matches!(self, Outcome::NoChange)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Código de saída do processo: 0 sucesso, 1 erro, 3 sem mudanças.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Error(_) => 1,
            Outcome::NoChange => 3,
        }
    }
}

impl Add for Outcome {
    type Output = Outcome;

    fn add(self, rhs: Outcome) -> Outcome {
        match (self, rhs) {
            (Outcome::Error(a), Outcome::Error(b)) => Outcome::Error(format!("{a}\n{b}")),
            (Outcome::Error(a), _) | (_, Outcome::Error(a)) => Outcome::Error(a),
            (Outcome::Success, _) | (_, Outcome::Success) => Outcome::Success,
            (Outcome::NoChange, Outcome::NoChange) => Outcome::NoChange,
        }
    }
}

impl AddAssign for Outcome {
    fn add_assign(&mut self, rhs: Outcome) {
        let lhs = std::mem::take(self);
        *self = lhs + rhs;
    }
}

impl<E: fmt::Display> From<Result<(), E>> for Outcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::Error(e.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "sucesso"),
            Outcome::NoChange => write!(f, "sem mudanças"),
            Outcome::Error(msg) => write!(f, "erro: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_change_is_identity() {
        assert_eq!(Outcome::NoChange + Outcome::NoChange, Outcome::NoChange);
        assert_eq!(Outcome::NoChange + Outcome::Success, Outcome::Success);
        assert_eq!(Outcome::Success + Outcome::NoChange, Outcome::Success);
    }

    #[test]
    fn test_error_dominates() {
        let mut total = Outcome::Success;
        total += Outcome::error("volume a");
        total += Outcome::Success;
        total += Outcome::error("volume b");
        assert!(total.is_error());
        assert_eq!(total.message(), Some("volume a\nvolume b"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::error("x").exit_code(), 1);
        assert_eq!(Outcome::NoChange.exit_code(), 3);
    }

    #[test]
    fn test_from_result() {
        let ok: Result<(), String> = Ok(());
        assert_eq!(Outcome::from(ok), Outcome::Success);
        let err: Result<(), String> = Err("falhou".to_string());
        assert_eq!(Outcome::from(err), Outcome::error("falhou"));
    }
}
