//! Section writer and renderer for the agent's key/value grammar.
//!
//! Every file is a sequence of `[SECTION]` headers, one blank line apart,
//! each followed by entry lines of the form `    Key  Value`. Entries with an
//! empty value are never written.

use std::fmt::{self, Display, Write};
use tracing::debug;

use crate::config::{
    AgentConfig, ForwardOutput, InputConfig, KeyValues, ModifyFilter, NetworkOptions,
    OutputTarget, ServiceConfig, TcpOutput, UpstreamConfig,
};
use crate::error::{CheckError, Result};

use super::rendered::RenderedConfig;
use super::{
    BASE_CONFIG_NAME, CUSTOM_PARSERS_CONFIG_NAME, OPERATOR_CONFIG_PATH, TLS_PATH,
    UPSTREAM_CONFIG_NAME,
};

/// Renderer for agent configuration models.
#[derive(Debug, Default)]
pub struct Renderer;

/// Accumulates sections and entries into a single file.
struct SectionWriter {
    out: String,
}

impl SectionWriter {
    const fn new() -> Self {
        Self { out: String::new() }
    }

    fn section(&mut self, name: &str) -> fmt::Result {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        writeln!(self.out, "[{name}]")
    }

    fn entry(&mut self, key: &str, value: impl Display) -> fmt::Result {
        let value = value.to_string();
        if value.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "    {key}  {value}")
    }

    fn entry_nonzero(&mut self, key: &str, value: u32) -> fmt::Result {
        if value == 0 {
            return Ok(());
        }
        self.entry(key, value)
    }

    fn entry_opt<T: Display>(&mut self, key: &str, value: Option<T>) -> fmt::Result {
        match value {
            Some(value) => self.entry(key, value),
            None => Ok(()),
        }
    }

    fn entries(&mut self, values: &KeyValues) -> fmt::Result {
        for (key, value) in values.iter() {
            self.entry(key, value)?;
        }
        Ok(())
    }

    fn finish(self) -> String {
        self.out
    }
}

impl Renderer {
    /// Creates a new renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Renders a model into its configuration files.
    ///
    /// Rendering never rejects a model: conflicting settings are caught by
    /// [`ConfigValidator`](crate::config::ConfigValidator) before rendering
    /// and by the dry-run after it.
    ///
    /// # Errors
    ///
    /// Returns an error only if writing into the output buffer fails.
    pub fn render(&self, agent: &AgentConfig) -> Result<RenderedConfig> {
        let main = Self::render_main(agent).map_err(|e| render_error(BASE_CONFIG_NAME, e))?;

        let upstream = match &agent.forward_output {
            Some(out) if out.upstream.enabled => Some(
                Self::render_upstream(&out.upstream.config)
                    .map_err(|e| render_error(UPSTREAM_CONFIG_NAME, e))?,
            ),
            _ => None,
        };

        let custom_parsers = agent.custom_parsers().map(|text| {
            let mut content = text.to_string();
            if !content.ends_with('\n') {
                content.push('\n');
            }
            content
        });

        let rendered = RenderedConfig::new(main, upstream, custom_parsers);
        debug!(
            "Rendered {} file(s), {} output block(s)",
            rendered.files().len(),
            agent.output_count()
        );

        Ok(rendered)
    }

    /// Renders the main configuration file.
    fn render_main(agent: &AgentConfig) -> std::result::Result<String, fmt::Error> {
        let mut w = SectionWriter::new();

        Self::write_service(&mut w, &agent.service, agent.custom_parsers().is_some())?;
        Self::write_input(&mut w, &agent.input)?;

        if !agent.disable_kubernetes_filter {
            w.section("FILTER")?;
            w.entry("Name", "kubernetes")?;
            w.entries(&agent.kubernetes_filter)?;
        }

        if let Some(aws) = agent.aws_filter.as_ref().filter(|f| !f.is_empty()) {
            w.section("FILTER")?;
            w.entry("Name", "aws")?;
            w.entries(aws)?;
        }

        for modify in &agent.filter_modify {
            Self::write_modify(&mut w, modify)?;
        }

        if let Some(out) = &agent.forward_output {
            for target in &out.targets {
                Self::write_forward(&mut w, out, target)?;
            }
        }

        if let Some(out) = &agent.tcp_output {
            for target in &out.targets {
                Self::write_tcp(&mut w, out, target)?;
            }
        }

        Ok(w.finish())
    }

    fn write_service(
        w: &mut SectionWriter,
        service: &ServiceConfig,
        custom_parsers: bool,
    ) -> fmt::Result {
        w.section("SERVICE")?;
        w.entry_nonzero("Flush", service.flush)?;
        w.entry_nonzero("Grace", service.grace)?;
        w.entry("Daemon", "Off")?;
        w.entry("Log_Level", &service.log_level)?;
        w.entry("Parsers_File", &service.default_parsers)?;
        if custom_parsers {
            w.entry(
                "Parsers_File",
                format_args!("{OPERATOR_CONFIG_PATH}/{CUSTOM_PARSERS_CONFIG_NAME}"),
            )?;
        }
        w.entry_nonzero("Coro_Stack_Size", service.coro_stack_size)?;
        if service.monitor.enabled {
            w.entry("HTTP_Server", "On")?;
            w.entry("HTTP_Listen", "0.0.0.0")?;
            w.entry("HTTP_Port", service.monitor.port)?;
        }
        w.entries(&service.buffer_storage)
    }

    fn write_input(w: &mut SectionWriter, input: &InputConfig) -> fmt::Result {
        w.section("INPUT")?;
        w.entry("Name", "tail")?;
        w.entries(&input.values)?;

        for (index, parser) in input.parser_n.iter().enumerate() {
            w.entry(&format!("Parser_{index}"), parser)?;
        }

        let chain: Vec<&str> = input
            .multiline_parser
            .iter()
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .collect();
        w.entry("multiline.parser", chain.join(", "))
    }

    fn write_modify(w: &mut SectionWriter, modify: &ModifyFilter) -> fmt::Result {
        // Conditions without rules change nothing.
        if modify.rules.is_empty() {
            return Ok(());
        }

        w.section("FILTER")?;
        w.entry("Name", "modify")?;
        w.entry("Match", "*")?;

        for condition in &modify.conditions {
            w.entry("Condition", operand(&condition.op, &condition.key, condition.value.as_deref()))?;
        }

        for rule in &modify.rules {
            w.entry(&rule.op, operand_tail(&rule.key, rule.value.as_deref()))?;
        }

        Ok(())
    }

    fn write_forward(
        w: &mut SectionWriter,
        out: &ForwardOutput,
        target: &OutputTarget,
    ) -> fmt::Result {
        w.section("OUTPUT")?;
        w.entry("Name", "forward")?;
        w.entry("Match", target.match_pattern())?;

        if out.upstream.enabled {
            w.entry("Upstream", format_args!("{OPERATOR_CONFIG_PATH}/{UPSTREAM_CONFIG_NAME}"))?;
        } else {
            w.entry("Host", &target.host)?;
            w.entry_nonzero("Port", u32::from(target.port))?;
        }

        if out.tls.enabled {
            w.entry("tls", "On")?;
            w.entry("tls.verify", "Off")?;
            w.entry("tls.ca_file", format_args!("{TLS_PATH}/ca.crt"))?;
            w.entry("tls.crt_file", format_args!("{TLS_PATH}/tls.crt"))?;
            w.entry("tls.key_file", format_args!("{TLS_PATH}/tls.key"))?;
            if out.tls.shared_key.is_empty() {
                w.entry("Empty_Shared_Key", "true")?;
            } else {
                w.entry("Shared_Key", &out.tls.shared_key)?;
            }
        }

        Self::write_network(w, &out.network)?;
        w.entries(&out.options)
    }

    fn write_tcp(w: &mut SectionWriter, out: &TcpOutput, target: &OutputTarget) -> fmt::Result {
        w.section("OUTPUT")?;
        w.entry("Name", "tcp")?;
        w.entry("Match", target.match_pattern())?;
        w.entry("Host", &target.host)?;
        w.entry_nonzero("Port", u32::from(target.port))?;
        w.entry("Format", "json_lines")?;
        w.entry("json_date_key", &out.json_date_key)?;
        w.entry("json_date_format", &out.json_date_format)?;
        w.entry_opt("Workers", out.workers)?;
        Self::write_network(w, &out.network)
    }

    /// Writes network options; `None` means unset and is skipped, while an
    /// explicit `false` or `0` is written.
    fn write_network(w: &mut SectionWriter, net: &NetworkOptions) -> fmt::Result {
        w.entry_opt("net.connect_timeout", net.connect_timeout)?;
        w.entry_opt("net.connect_timeout_log_error", net.connect_timeout_log_error)?;
        w.entry("net.dns.mode", &net.dns_mode)?;
        w.entry_opt("net.dns.prefer_ipv4", net.dns_prefer_ipv4)?;
        w.entry("net.dns.resolver", &net.dns_resolver)?;
        w.entry_opt(
            "net.keepalive",
            net.keepalive.map(|on| if on { "on" } else { "off" }),
        )?;
        w.entry_opt("net.keepalive_idle_timeout", net.keepalive_idle_timeout)?;
        w.entry_opt("net.keepalive_max_recycle", net.keepalive_max_recycle)?;
        w.entry("net.source_address", &net.source_address)
    }

    /// Renders the upstream node list file.
    fn render_upstream(upstream: &UpstreamConfig) -> std::result::Result<String, fmt::Error> {
        let mut w = SectionWriter::new();

        w.section("UPSTREAM")?;
        w.entry("Name", &upstream.name)?;

        for node in &upstream.nodes {
            w.section("NODE")?;
            w.entry("Name", &node.name)?;
            w.entry("Host", &node.host)?;
            w.entry_nonzero("Port", u32::from(node.port))?;
        }

        Ok(w.finish())
    }
}

fn operand(op: &str, key: &str, value: Option<&str>) -> String {
    format!("{op} {}", operand_tail(key, value))
}

fn operand_tail(key: &str, value: Option<&str>) -> String {
    match value.filter(|v| !v.is_empty()) {
        Some(value) => format!("{key} {value}"),
        None => key.to_string(),
    }
}

fn render_error(file: &str, err: fmt::Error) -> CheckError {
    CheckError::internal(format!("Failed to render {file}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModifyOperation, TlsSettings, UpstreamNode, UpstreamSettings};

    fn minimal_agent() -> AgentConfig {
        AgentConfig {
            disable_kubernetes_filter: true,
            ..AgentConfig::default()
        }
    }

    fn render(agent: &AgentConfig) -> RenderedConfig {
        Renderer::new().render(agent).unwrap()
    }

    #[test]
    fn test_minimal_model_renders_service_and_input_only() {
        let rendered = render(&minimal_agent());

        let expected = "\
[SERVICE]
    Flush  1
    Grace  5
    Daemon  Off
    Log_Level  info
    Parsers_File  /fluent-bit/etc/parsers.conf
    Coro_Stack_Size  24576

[INPUT]
    Name  tail
";
        assert_eq!(rendered.main(), expected);
        assert_eq!(rendered.files().len(), 1);
        assert!(!rendered.main().contains("[FILTER]"));
        assert!(!rendered.main().contains("[OUTPUT]"));
    }

    #[test]
    fn test_default_model_includes_kubernetes_filter() {
        let mut agent = AgentConfig::default();
        agent.kubernetes_filter.insert("Match", "kubernetes.*");
        agent.kubernetes_filter.insert("Merge_Log", "");

        let rendered = render(&agent);
        assert!(rendered.main().ends_with(
            "\n[FILTER]\n    Name  kubernetes\n    Match  kubernetes.*\n"
        ));
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut agent = AgentConfig::default();
        agent.input.values.insert("Path", "/var/log/containers/*.log");
        agent.forward_output = Some(ForwardOutput {
            targets: vec![OutputTarget::new("aggregator", 24240)],
            ..ForwardOutput::default()
        });
        let copy = agent.clone();

        let first = render(&agent);
        let second = render(&copy);

        assert_eq!(first.to_bytes(), second.to_bytes());
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_emitted_field_change_changes_fingerprint() {
        let agent = minimal_agent();
        let mut changed = agent.clone();
        changed.service.log_level = String::from("debug");

        assert_ne!(render(&agent).fingerprint(), render(&changed).fingerprint());
    }

    #[test]
    fn test_input_keeps_model_order() {
        let mut agent = minimal_agent();
        agent.input.values = KeyValues::new()
            .with("Path", "/var/log/containers/*.log")
            .with("DB", "/tail-db/tail.db")
            .with("Empty", "")
            .with("Mem_Buf_Limit", "5MB");
        agent.input.parser_n = vec![String::from("docker"), String::from("cri")];
        agent.input.multiline_parser = vec![String::from("docker"), String::from("cri")];

        let rendered = render(&agent);
        assert!(rendered.main().ends_with(
            "\
[INPUT]
    Name  tail
    Path  /var/log/containers/*.log
    DB  /tail-db/tail.db
    Mem_Buf_Limit  5MB
    Parser_0  docker
    Parser_1  cri
    multiline.parser  docker, cri
"
        ));
    }

    #[test]
    fn test_service_monitor_custom_parsers_and_storage() {
        let mut agent = minimal_agent();
        agent.service.monitor.enabled = true;
        agent.service.buffer_storage = KeyValues::new().with("storage.path", "/buffers");
        agent.custom_parsers = Some(String::from("[PARSER]\n    Name  custom"));

        let rendered = render(&agent);
        assert!(rendered.main().starts_with(
            "\
[SERVICE]
    Flush  1
    Grace  5
    Daemon  Off
    Log_Level  info
    Parsers_File  /fluent-bit/etc/parsers.conf
    Parsers_File  /fluent-bit/etc-operator/custom-parsers.conf
    Coro_Stack_Size  24576
    HTTP_Server  On
    HTTP_Listen  0.0.0.0
    HTTP_Port  2020
    storage.path  /buffers
"
        ));
        assert_eq!(
            rendered.file(CUSTOM_PARSERS_CONFIG_NAME),
            Some("[PARSER]\n    Name  custom\n")
        );
    }

    #[test]
    fn test_blank_custom_parsers_are_ignored() {
        let mut agent = minimal_agent();
        agent.custom_parsers = Some(String::from("  \n"));

        let rendered = render(&agent);
        assert!(rendered.file(CUSTOM_PARSERS_CONFIG_NAME).is_none());
        assert!(!rendered.main().contains("custom-parsers.conf"));
    }

    #[test]
    fn test_zero_service_numbers_are_omitted() {
        let mut agent = minimal_agent();
        agent.service.grace = 0;
        agent.service.coro_stack_size = 0;

        let main = render(&agent).main().to_string();
        assert!(!main.contains("Grace"));
        assert!(!main.contains("Coro_Stack_Size"));
    }

    #[test]
    fn test_aws_filter_requires_entries() {
        let mut agent = minimal_agent();
        agent.aws_filter = Some(KeyValues::new());
        assert!(!render(&agent).main().contains("aws"));

        agent.aws_filter = Some(KeyValues::new().with("imds_version", "v2"));
        assert!(render(&agent)
            .main()
            .ends_with("\n[FILTER]\n    Name  aws\n    imds_version  v2\n"));
    }

    #[test]
    fn test_modify_filters_in_declaration_order() {
        let mut agent = minimal_agent();
        agent.filter_modify = vec![
            ModifyFilter {
                conditions: vec![ModifyOperation::new("Key_exists", "level", None)],
                rules: vec![ModifyOperation::new("Rename", "level", Some("severity"))],
            },
            ModifyFilter {
                conditions: vec![],
                rules: vec![ModifyOperation::new("Remove", "password", None)],
            },
            ModifyFilter {
                conditions: vec![ModifyOperation::new("Key_exists", "x", None)],
                rules: vec![],
            },
        ];

        let rendered = render(&agent);
        assert!(rendered.main().ends_with(
            "
[FILTER]
    Name  modify
    Match  *
    Condition  Key_exists level
    Rename  level severity

[FILTER]
    Name  modify
    Match  *
    Remove  password
"
        ));
    }

    #[test]
    fn test_forward_output_per_target() {
        let mut agent = minimal_agent();
        agent.forward_output = Some(ForwardOutput {
            targets: vec![
                OutputTarget::new("aggregator.logging.svc", 24240),
                OutputTarget::new("team-a.logging.svc", 24240).with_namespace("team-a"),
            ],
            options: KeyValues::new().with("Retry_Limit", "False"),
            ..ForwardOutput::default()
        });

        let rendered = render(&agent);
        assert!(rendered.main().ends_with(
            "
[OUTPUT]
    Name  forward
    Match  *
    Host  aggregator.logging.svc
    Port  24240
    Retry_Limit  False

[OUTPUT]
    Name  forward
    Match  *_team-a_*
    Host  team-a.logging.svc
    Port  24240
    Retry_Limit  False
"
        ));
        assert!(rendered.file(UPSTREAM_CONFIG_NAME).is_none());
    }

    #[test]
    fn test_forward_output_with_upstream_and_tls() {
        let mut agent = minimal_agent();
        agent.forward_output = Some(ForwardOutput {
            targets: vec![OutputTarget::new("ignored", 1)],
            upstream: UpstreamSettings {
                enabled: true,
                config: UpstreamConfig {
                    name: String::from("aggregators"),
                    nodes: vec![
                        UpstreamNode {
                            name: String::from("node-0"),
                            host: String::from("agg-0.logging.svc"),
                            port: 24240,
                        },
                        UpstreamNode {
                            name: String::from("node-1"),
                            host: String::from("agg-1.logging.svc"),
                            port: 24240,
                        },
                    ],
                },
            },
            tls: TlsSettings {
                enabled: true,
                shared_key: String::new(),
            },
            ..ForwardOutput::default()
        });

        let rendered = render(&agent);
        assert!(rendered.main().ends_with(
            "
[OUTPUT]
    Name  forward
    Match  *
    Upstream  /fluent-bit/etc-operator/upstream.conf
    tls  On
    tls.verify  Off
    tls.ca_file  /fluent-bit/tls/ca.crt
    tls.crt_file  /fluent-bit/tls/tls.crt
    tls.key_file  /fluent-bit/tls/tls.key
    Empty_Shared_Key  true
"
        ));
        assert_eq!(
            rendered.file(UPSTREAM_CONFIG_NAME),
            Some(
                "\
[UPSTREAM]
    Name  aggregators

[NODE]
    Name  node-0
    Host  agg-0.logging.svc
    Port  24240

[NODE]
    Name  node-1
    Host  agg-1.logging.svc
    Port  24240
"
            )
        );
    }

    #[test]
    fn test_shared_key_is_emitted_when_set() {
        let mut agent = minimal_agent();
        agent.forward_output = Some(ForwardOutput {
            targets: vec![OutputTarget::new("agg", 24240)],
            tls: TlsSettings {
                enabled: true,
                shared_key: String::from("s3cr3t"),
            },
            ..ForwardOutput::default()
        });

        let main = render(&agent).main().to_string();
        assert!(main.contains("    Shared_Key  s3cr3t\n"));
        assert!(!main.contains("Empty_Shared_Key"));
    }

    #[test]
    fn test_network_options_distinguish_unset_from_false() {
        let mut agent = minimal_agent();
        agent.tcp_output = Some(TcpOutput {
            targets: vec![OutputTarget::new("syslog-ng.logging.svc", 601)],
            ..TcpOutput::default()
        });
        let unset = render(&agent).main().to_string();
        assert!(!unset.contains("net."));
        assert!(!unset.contains("Workers"));

        agent.tcp_output = Some(TcpOutput {
            targets: vec![OutputTarget::new("syslog-ng.logging.svc", 601)],
            json_date_key: String::from("ts"),
            json_date_format: String::from("iso8601"),
            workers: Some(0),
            network: NetworkOptions {
                connect_timeout: Some(0),
                connect_timeout_log_error: Some(false),
                dns_mode: String::from("TCP"),
                dns_prefer_ipv4: Some(false),
                dns_resolver: String::new(),
                keepalive: Some(false),
                keepalive_idle_timeout: None,
                keepalive_max_recycle: Some(100),
                source_address: String::new(),
            },
        });

        let rendered = render(&agent);
        assert!(rendered.main().ends_with(
            "
[OUTPUT]
    Name  tcp
    Match  *
    Host  syslog-ng.logging.svc
    Port  601
    Format  json_lines
    json_date_key  ts
    json_date_format  iso8601
    Workers  0
    net.connect_timeout  0
    net.connect_timeout_log_error  false
    net.dns.mode  TCP
    net.dns.prefer_ipv4  false
    net.keepalive  off
    net.keepalive_max_recycle  100
"
        ));
    }

    #[test]
    fn test_forward_outputs_precede_tcp_outputs() {
        let mut agent = minimal_agent();
        agent.tcp_output = Some(TcpOutput {
            targets: vec![OutputTarget::new("tcp-host", 601)],
            ..TcpOutput::default()
        });
        agent.forward_output = Some(ForwardOutput {
            targets: vec![OutputTarget::new("fwd-host", 24240)],
            ..ForwardOutput::default()
        });

        let main = render(&agent).main().to_string();
        let forward = main.find("fwd-host").unwrap();
        let tcp = main.find("tcp-host").unwrap();
        assert!(forward < tcp);
    }
}
