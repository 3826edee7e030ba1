//! Human input collection
//!
//! Line-oriented prompts over any `BufRead`/`Write` pair, so the same code
//! drives the terminal and scripted tests. Presentation-level checks happen
//! here and the operator is asked again on bad input; nothing invalid is
//! handed to the planner.

use std::io::{BufRead, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::configs::IdentityDefaults;
use crate::conversion::{ConversionPolicy, ConversionRequest};
use crate::error::ProvisionError;
use crate::identity::{SubjectIdentity, SubjectIdentityBuilder};
use crate::profile::{PasswordPolicy, Profile};
use crate::san::{is_dns_name, parse_ipv4};
use crate::topology::{check_count, NodeRecord, Strategy, MAX_NODE_IPS};

/// Raw identity answers, kept so a single bad field can be asked again.
#[derive(Debug, Default, Clone)]
struct IdentityAnswers {
    country: String,
    state: String,
    locality: String,
    organization: String,
    organizational_unit: String,
    email: String,
}

impl IdentityAnswers {
    fn build(&self) -> crate::error::Result<SubjectIdentity> {
        SubjectIdentityBuilder::new()
            .country(self.country.clone())
            .state(self.state.clone())
            .locality(self.locality.clone())
            .organization(self.organization.clone())
            .organizational_unit(self.organizational_unit.clone())
            .email(self.email.clone())
            .build()
    }
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print a line to the operator.
    pub fn say(&mut self, text: impl AsRef<str>) -> Result<()> {
        writeln!(self.output, "{}", text.as_ref())?;
        Ok(())
    }

    /// Ask for one line. An empty answer yields `default` (or the empty
    /// string). Closed input is an error.
    pub fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        match self.ask_or_eof(question, default)? {
            Some(answer) => Ok(answer),
            None => bail!("Input closed while waiting for: {}", question),
        }
    }

    /// Like [`Prompter::ask`], but closed input yields `None`.
    pub fn ask_or_eof(&mut self, question: &str, default: Option<&str>) -> Result<Option<String>> {
        match default {
            Some(d) if !d.is_empty() => write!(self.output, "{} [{}]: ", question, d)?,
            _ => write!(self.output, "{}: ", question)?,
        }
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let answer = line.trim();
        if answer.is_empty() {
            Ok(Some(default.unwrap_or_default().to_string()))
        } else {
            Ok(Some(answer.to_string()))
        }
    }

    pub fn ask_yes_no(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            let answer = self.ask(&format!("{} ({})", question, hint), None)?;
            match answer.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("✗ Please answer y or n")?,
            }
        }
    }

    pub fn choose_profile(&mut self) -> Result<Profile> {
        self.say("")?;
        for (i, profile) in Profile::ALL.iter().enumerate() {
            self.say(format!("{}. {}", i + 1, profile))?;
        }
        loop {
            let answer = self.ask("Select a component", None)?;
            let by_number = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| Profile::ALL.get(i).copied());
            match by_number.or_else(|| Profile::from_name(&answer)) {
                Some(profile) => return Ok(profile),
                None => self.say(format!("✗ Unknown component '{}'", answer))?,
            }
        }
    }

    /// Collect the subject identity, asking again for any field that fails
    /// validation.
    pub fn collect_identity(&mut self, defaults: &IdentityDefaults) -> Result<SubjectIdentity> {
        self.say("\n=== Subject Identity ===")?;
        let mut answers = IdentityAnswers {
            country: self.ask_country(defaults.country.as_deref())?,
            state: self.ask("State or province (optional)", defaults.state.as_deref())?,
            locality: self.ask("Locality (optional)", defaults.locality.as_deref())?,
            organization: self.ask("Organization (optional)", defaults.organization.as_deref())?,
            organizational_unit: self.ask(
                "Organizational unit (optional)",
                defaults.organizational_unit.as_deref(),
            )?,
            email: self.ask("Email address (optional)", defaults.email.as_deref())?,
        };

        loop {
            match answers.build() {
                Ok(identity) => return Ok(identity),
                Err(ProvisionError::InvalidField { field, reason }) => {
                    self.say(format!("✗ Invalid {}: {}", field, reason))?;
                    let slot = match field.as_str() {
                        "country" => {
                            answers.country = self.ask_country(None)?;
                            continue;
                        }
                        "state" => &mut answers.state,
                        "locality" => &mut answers.locality,
                        "organization" => &mut answers.organization,
                        "organizational unit" => &mut answers.organizational_unit,
                        "email" => &mut answers.email,
                        other => bail!("Unexpected identity field '{}'", other),
                    };
                    let question = format!("{} (leave empty to omit)", capitalize(&field));
                    *slot = self.ask(&question, None)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn ask_country(&mut self, default: Option<&str>) -> Result<String> {
        Ok(self
            .ask("Country code (2 letters)", default)?
            .to_ascii_uppercase())
    }

    pub fn collect_count(&mut self, profile: Profile) -> Result<usize> {
        let max = profile.descriptor().max_nodes;
        loop {
            let answer = self.ask(&format!("Number of {} nodes (1-{})", profile, max), Some("1"))?;
            let Ok(count) = answer.parse::<usize>() else {
                self.say(format!("✗ '{}' is not a number", answer))?;
                continue;
            };
            match check_count(profile, count) {
                Ok(()) => return Ok(count),
                Err(e) => self.say(format!("✗ {}", e))?,
            }
        }
    }

    /// Ask which strategy to use and, for a shared certificate, the optional
    /// load balancer FQDN. Profiles or counts without a choice get
    /// `UniquePerNode` and no load balancer.
    pub fn collect_strategy(
        &mut self,
        profile: Profile,
        count: usize,
    ) -> Result<(Strategy, Option<String>)> {
        if !profile.offers_strategy(count) {
            return Ok((Strategy::UniquePerNode, None));
        }
        self.say("\n1. One certificate covering every node (SAN)")?;
        self.say("2. One certificate per node")?;
        let strategy = loop {
            match self.ask("Certificate strategy", Some("1"))?.as_str() {
                "1" => break Strategy::SingleWithSan,
                "2" => break Strategy::UniquePerNode,
                other => self.say(format!("✗ Unknown option '{}'", other))?,
            }
        };
        if strategy == Strategy::UniquePerNode {
            return Ok((strategy, None));
        }
        loop {
            let lb = self.ask("Load balancer FQDN (optional)", None)?;
            if lb.is_empty() {
                return Ok((strategy, None));
            }
            if is_dns_name(&lb) {
                return Ok((strategy, Some(lb)));
            }
            self.say(format!("✗ '{}' is not a valid DNS name", lb))?;
        }
    }

    pub fn collect_nodes(&mut self, profile: Profile, count: usize) -> Result<Vec<NodeRecord>> {
        let with_addresses = profile.descriptor().node_addresses;
        let mut nodes = Vec::with_capacity(count);
        for i in 1..=count {
            self.say(format!("\n--- {} node {} of {} ---", profile, i, count))?;
            let fqdn = self.ask_dns_name("FQDN")?;
            if !with_addresses {
                nodes.push(NodeRecord::new(fqdn));
                continue;
            }
            let suggested = fqdn.split('.').next().unwrap_or_default().to_string();
            let hostname = loop {
                let hostname = self.ask("Hostname", Some(&suggested))?;
                if is_dns_name(&hostname) {
                    break hostname;
                }
                self.say(format!("✗ '{}' is not a valid host name", hostname))?;
            };
            let ips = self.ask_ips()?;
            nodes.push(NodeRecord::with_addresses(fqdn, hostname, ips));
        }
        Ok(nodes)
    }

    fn ask_dns_name(&mut self, question: &str) -> Result<String> {
        loop {
            let name = self.ask(question, None)?;
            if is_dns_name(&name) {
                return Ok(name);
            }
            self.say(format!("✗ '{}' is not a valid DNS name", name))?;
        }
    }

    fn ask_ips(&mut self) -> Result<Vec<Ipv4Addr>> {
        loop {
            let answer = self.ask(
                &format!("IP addresses (1-{}, comma separated)", MAX_NODE_IPS),
                None,
            )?;
            let parsed: Option<Vec<Ipv4Addr>> = split_list(&answer)
                .iter()
                .map(|s| parse_ipv4(s))
                .collect();
            match parsed {
                Some(ips) if (1..=MAX_NODE_IPS).contains(&ips.len()) => return Ok(ips),
                Some(_) => {
                    self.say(format!("✗ Enter between 1 and {} addresses", MAX_NODE_IPS))?
                }
                None => {
                    self.say(format!("✗ '{}' contains an invalid IPv4 address", answer))?
                }
            }
        }
    }

    /// Extra SAN strings, unvalidated; the SAN set reports what it rejects.
    pub fn collect_extra_sans(&mut self) -> Result<Vec<String>> {
        let answer = self.ask(
            "Additional SAN entries (DNS names or IPv4, comma separated, optional)",
            None,
        )?;
        Ok(split_list(&answer))
    }

    /// Password choice and chain override for one profile's conversion.
    pub fn collect_conversion(&mut self, profile: Profile) -> Result<ConversionRequest> {
        let policy = ConversionPolicy::for_profile(profile);
        let mut request = ConversionRequest::default();

        match policy.password_policy() {
            PasswordPolicy::Optional { default } => {
                let protect = self.ask_yes_no("Protect the PFX with a password?", default)?;
                request.protect = Some(protect);
            }
            PasswordPolicy::Mandatory => {
                self.say(format!("{} bundles are always password protected.", profile))?;
            }
        }

        if policy.accepts_chain_override() {
            request.intermediate =
                self.ask_existing_file("Intermediate CA certificate path (optional)")?;
            request.root = self.ask_existing_file("Root CA certificate path (optional)")?;
        }
        Ok(request)
    }

    fn ask_existing_file(&mut self, question: &str) -> Result<Option<PathBuf>> {
        loop {
            let answer = self.ask(question, None)?;
            if answer.is_empty() {
                return Ok(None);
            }
            let path = PathBuf::from(&answer);
            if path.is_file() {
                return Ok(Some(path));
            }
            self.say(format!("✗ File not found: {}", answer))?;
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(script: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn identity_reasks_only_the_bad_field() {
        let mut p = prompter("us\n\n\nCorp\n\nnot-an-email\nops@corp.example\n");
        let identity = p.collect_identity(&IdentityDefaults::default()).unwrap();
        assert_eq!(identity.country(), "US");
        assert_eq!(identity.organization(), Some("Corp"));
        assert_eq!(identity.email(), Some("ops@corp.example"));
        assert!(identity.state().is_none());
        let shown = String::from_utf8(p.output).unwrap();
        assert!(shown.contains("✗ Invalid email"));
    }

    #[test]
    fn identity_defaults_fill_empty_answers() {
        let defaults = IdentityDefaults {
            country: Some("DE".to_string()),
            organization: Some("Example GmbH".to_string()),
            ..Default::default()
        };
        let mut p = prompter("\n\n\n\n\n\n");
        let identity = p.collect_identity(&defaults).unwrap();
        assert_eq!(identity.country(), "DE");
        assert_eq!(identity.organization(), Some("Example GmbH"));
    }

    #[test]
    fn count_is_bounded_by_profile() {
        let mut p = prompter("3\nabc\n2\n");
        assert_eq!(p.collect_count(Profile::Pta).unwrap(), 2);
    }

    #[test]
    fn vault_nodes_collect_addresses() {
        let mut p = prompter("vault1.corp.example\n\n10.0.0.1, 10.0.1.1\n");
        let nodes = p.collect_nodes(Profile::Vault, 1).unwrap();
        assert_eq!(nodes[0].hostname.as_deref(), Some("vault1"));
        assert_eq!(
            nodes[0].ips,
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 1, 1)]
        );
    }

    #[test]
    fn ip_list_is_reasked_when_too_long() {
        let mut p = prompter("v.corp.example\nv\n1.1.1.1,2.2.2.2,3.3.3.3,4.4.4.4\n1.1.1.1\n");
        let nodes = p.collect_nodes(Profile::Vault, 1).unwrap();
        assert_eq!(nodes[0].ips.len(), 1);
    }

    #[test]
    fn ip_octets_may_carry_leading_zeros() {
        let mut p = prompter("v.corp.example\nv\n010.000.0.1\n");
        let nodes = p.collect_nodes(Profile::Vault, 1).unwrap();
        assert_eq!(nodes[0].ips, vec![Ipv4Addr::new(10, 0, 0, 1)]);
    }

    #[test]
    fn strategy_only_offered_when_meaningful() {
        let mut p = prompter("");
        assert_eq!(
            p.collect_strategy(Profile::Vault, 3).unwrap(),
            (Strategy::UniquePerNode, None)
        );
        let mut p = prompter("1\npsm-lb.corp.example\n");
        assert_eq!(
            p.collect_strategy(Profile::Psm, 3).unwrap(),
            (Strategy::SingleWithSan, Some("psm-lb.corp.example".to_string()))
        );
    }

    #[test]
    fn conversion_uses_profile_default() {
        let mut p = prompter("\n");
        assert_eq!(p.collect_conversion(Profile::Html5Gw).unwrap().protect, Some(true));
        let mut p = prompter("");
        assert_eq!(p.collect_conversion(Profile::Vault).unwrap().protect, None);
    }

    #[test]
    fn profile_by_number_or_name() {
        assert_eq!(prompter("5\n").choose_profile().unwrap(), Profile::Vault);
        assert_eq!(prompter("nope\npsm\n").choose_profile().unwrap(), Profile::Psm);
    }

    #[test]
    fn closed_input_is_an_error() {
        assert!(prompter("").ask("anything", None).is_err());
        assert_eq!(prompter("").ask_or_eof("anything", None).unwrap(), None);
    }

    #[test]
    fn extra_sans_split_on_commas_and_spaces() {
        let mut p = prompter("a.example, 10.0.0.5  b.example\n");
        assert_eq!(
            p.collect_extra_sans().unwrap(),
            vec!["a.example", "10.0.0.5", "b.example"]
        );
    }
}
