/// External capture-session signals the recorder subscribes to.
///
/// Platform glue (audio session interruptions, device hot-plug) translates
/// its notifications into these and sends them over the recorder's event
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Capture was interrupted (incoming call, another app took the
    /// device); treated as a pause
    InterruptionBegan,

    /// Interruption ended; resume only if the platform says so
    InterruptionEnded { should_resume: bool },

    /// Output/input route changed; a lost device pauses recording
    RouteChanged { device_lost: bool },
}
