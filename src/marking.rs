use anyhow::{Result, anyhow};
use std::fmt::{Debug, Display, Formatter};

/// A multiset of places: for each place, the number of tokens in it.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Marking {
    pub(crate) place2token: Vec<u64>,
}

impl Marking {
    pub fn new(size: usize) -> Self {
        Marking {
            place2token: vec![0; size],
        }
    }

    pub fn get_place2token(&self) -> &Vec<u64> {
        &self.place2token
    }

    pub fn get_number_of_places(&self) -> usize {
        self.place2token.len()
    }

    pub fn get_tokens(&self, place: usize) -> u64 {
        self.place2token[place]
    }

    pub fn increase(&mut self, place: usize, amount: u64) -> Result<()> {
        self.place2token[place] = self.place2token[place]
            .checked_add(amount)
            .ok_or_else(|| anyhow!("tried to put too many tokens in place {}", place))?;
        Ok(())
    }

    pub fn decrease(&mut self, place: usize, amount: u64) -> Result<()> {
        if self.place2token[place] < amount {
            return Err(anyhow!(
                "tried to obtain a negative number of tokens in place {}",
                place
            ));
        }
        self.place2token[place] -= amount;
        Ok(())
    }

    pub fn add_place(&mut self) {
        self.place2token.push(0);
    }

    pub fn is_empty(&self) -> bool {
        self.place2token.iter().all(|tokens| *tokens == 0)
    }

    pub fn get_maximum_tokens(&self) -> u64 {
        self.place2token.iter().copied().max().unwrap_or(0)
    }
}

impl From<Vec<u64>> for Marking {
    fn from(value: Vec<u64>) -> Self {
        Self { place2token: value }
    }
}

impl Display for Marking {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (place, multiplicity) in self.place2token.iter().enumerate() {
            if *multiplicity > 0 {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                write!(f, "p{}:{}", place, multiplicity)?;
            }
        }
        write!(f, "}}")
    }
}

impl Debug for Marking {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::Marking;

    #[test]
    fn marking_arithmetic() {
        let mut marking = Marking::new(2);
        marking.increase(1, 2).unwrap();
        assert!(marking.decrease(0, 1).is_err());
        marking.decrease(1, 1).unwrap();
        assert_eq!(marking, Marking::from(vec![0, 1]));
        assert_eq!(marking.to_string(), "{p1:1}");
    }

    #[test]
    fn marking_overflow() {
        let mut marking = Marking::from(vec![u64::MAX]);
        assert!(marking.increase(0, 1).is_err());
    }
}
