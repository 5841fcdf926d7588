use rdt_lab_abstract::ProtocolKind;

/// Map a user-visible protocol name to the protocol it selects.
pub fn protocol_by_name(name: &str) -> anyhow::Result<ProtocolKind> {
    match name.to_ascii_lowercase().as_str() {
        "abp" | "alternating-bit" | "alternating_bit" | "stop-and-wait" => {
            Ok(ProtocolKind::AlternatingBit)
        }
        "gbn" | "go-back-n" | "go_back_n" => Ok(ProtocolKind::GoBackN),
        other => anyhow::bail!("Unknown protocol '{other}'. Try 'abp' or 'gbn'."),
    }
}
