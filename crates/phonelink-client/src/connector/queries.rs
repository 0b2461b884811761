//! Read access to history, devices and rooms

use phonelink_core::{
    kinds, AccelerationMsg, ColorPointerMsg, DataMsg, Device, DeviceScope, Frame, FrameData,
    GridPointerMsg, GyroMsg, KeyMsg, Stamped,
};

use super::Connector;

impl Connector {
    // ─────────────────────────────────────────────────────────────
    // Devices and rooms
    // ─────────────────────────────────────────────────────────────

    /// Our own registration as acknowledged by the server.
    pub fn device(&self) -> Option<Device> {
        self.state().device.clone()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.state().devices.devices.clone()
    }

    pub fn device_count(&self) -> usize {
        self.state().devices.devices.len()
    }

    /// Every display (client) device.
    pub fn client_devices(&self) -> Vec<Device> {
        self.state().devices.clients().cloned().collect()
    }

    pub fn client_count(&self) -> usize {
        self.state().devices.clients().count()
    }

    /// The display registered under our device id, if one is connected.
    pub fn client_device(&self) -> Option<Device> {
        self.state()
            .devices
            .client_for(self.device_id())
            .cloned()
    }

    pub fn room_members(&self) -> Vec<Device> {
        self.state().room_members.clone()
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        self.state().joined_rooms.clone()
    }

    // ─────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────

    /// Every buffered message of every device, oldest first.
    pub fn data_list(&self) -> Vec<DataMsg> {
        self.state().history.query(None, &DeviceScope::All)
    }

    /// Buffered messages of `kind` (every kind when `None`), oldest first.
    pub fn all_data(&self, kind: Option<&str>, scope: &DeviceScope) -> Vec<DataMsg> {
        self.state().history.query(kind, scope)
    }

    /// Most recent message, or the kind's empty default.
    pub fn latest_data(&self, kind: Option<&str>, scope: &DeviceScope) -> DataMsg {
        self.state().history.latest(kind, scope)
    }

    fn typed_data<T: FrameData>(&self, scope: &DeviceScope) -> Vec<Stamped<T>> {
        self.state()
            .history
            .query(Some(T::KIND.as_str()), scope)
            .iter()
            .filter_map(|msg| msg.frame_data::<T>())
            .collect()
    }

    fn typed_latest<T: FrameData>(&self, scope: &DeviceScope) -> Stamped<T> {
        self.state()
            .history
            .latest(Some(T::KIND.as_str()), scope)
            .frame_data::<T>()
            .unwrap_or_default()
    }

    pub fn key_data(&self, scope: &DeviceScope) -> Vec<KeyMsg> {
        self.typed_data(scope)
    }

    pub fn acceleration_data(&self, scope: &DeviceScope) -> Vec<AccelerationMsg> {
        self.typed_data(scope)
    }

    pub fn gyro_data(&self, scope: &DeviceScope) -> Vec<GyroMsg> {
        self.typed_data(scope)
    }

    /// Pointer messages of both contexts.
    pub fn pointer_data(&self, scope: &DeviceScope) -> Vec<DataMsg> {
        self.all_data(Some(kinds::POINTER), scope)
    }

    pub fn color_pointer_data(&self, scope: &DeviceScope) -> Vec<ColorPointerMsg> {
        self.typed_data(scope)
    }

    pub fn grid_pointer_data(&self, scope: &DeviceScope) -> Vec<GridPointerMsg> {
        self.typed_data(scope)
    }

    pub fn latest_key(&self, scope: &DeviceScope) -> KeyMsg {
        self.typed_latest(scope)
    }

    pub fn latest_acceleration(&self, scope: &DeviceScope) -> AccelerationMsg {
        self.typed_latest(scope)
    }

    pub fn latest_gyro(&self, scope: &DeviceScope) -> GyroMsg {
        self.typed_latest(scope)
    }

    /// The newer of the latest color and grid pointer.
    pub fn latest_pointer(&self, scope: &DeviceScope) -> DataMsg {
        self.latest_data(Some(kinds::POINTER), scope)
    }

    pub fn latest_color_pointer(&self, scope: &DeviceScope) -> ColorPointerMsg {
        self.typed_latest(scope)
    }

    pub fn latest_grid_pointer(&self, scope: &DeviceScope) -> GridPointerMsg {
        self.typed_latest(scope)
    }

    // Own-device shortcuts

    /// Current frame of our own device.
    pub fn current_frame(&self) -> Frame {
        self.state().history.frame(self.device_id())
    }

    pub fn key(&self) -> KeyMsg {
        self.current_frame().key
    }

    pub fn acceleration(&self) -> AccelerationMsg {
        self.current_frame().acceleration
    }

    pub fn gyro(&self) -> GyroMsg {
        self.current_frame().gyro
    }

    pub fn pointer(&self) -> DataMsg {
        self.current_frame().latest_pointer()
    }

    pub fn color_pointer(&self) -> ColorPointerMsg {
        self.current_frame().color_pointer
    }

    pub fn grid_pointer(&self) -> GridPointerMsg {
        self.current_frame().grid_pointer
    }

    // ─────────────────────────────────────────────────────────────
    // Recording
    // ─────────────────────────────────────────────────────────────

    /// Forget the local history.
    pub fn clean_data(&self) {
        self.state().history.clear();
    }

    /// Clear the history and keep every message from now on.
    pub fn start_recording(&self) {
        self.state().history.start_recording();
    }

    /// Go back to bounded buffers. Recorded messages stay until evicted.
    pub fn stop_recording(&self) {
        self.state().history.stop_recording();
    }

    pub fn is_recording(&self) -> bool {
        self.state().history.is_recording()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{settle, started, SOCKET_ID};
    use super::*;
    use crate::protocol::events;
    use serde_json::json;

    #[tokio::test]
    async fn test_typed_history_queries() {
        let (connector, server) = started().await;
        server
            .push_data(json!({"type": "acceleration", "x": 1.0, "time_stamp": 2.0, "device_id": "FooBar"}))
            .await;
        server
            .push_data(json!({"type": "acceleration", "x": 2.0, "time_stamp": 1.0, "device_id": "FooBar"}))
            .await;
        server
            .push_data(json!({"type": "key", "key": "F3", "time_stamp": 3.0, "device_id": "Other"}))
            .await;
        settle().await;

        let own = DeviceScope::device("FooBar");
        let acc = connector.acceleration_data(&own);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc[0].data.x, 2.0);
        assert_eq!(acc[1].data.x, 1.0);

        assert!(connector.key_data(&own).is_empty());
        assert_eq!(connector.key_data(&DeviceScope::All).len(), 1);
        assert_eq!(connector.latest_key(&DeviceScope::All).data.key, "F3");
        assert_eq!(connector.data_list().len(), 3);
    }

    #[tokio::test]
    async fn test_latest_falls_back_to_defaults() {
        let (connector, _server) = started().await;
        let gyro = connector.latest_gyro(&DeviceScope::device("nobody"));
        assert_eq!(gyro.data.alpha, 0.0);
        assert_eq!(connector.latest_grid_pointer(&DeviceScope::All).data.row, -1);
        assert_eq!(connector.key().data.key, "");
        assert_eq!(connector.latest_data(Some("sprite_out"), &DeviceScope::All).kind(), "sprite_out");
    }

    #[tokio::test]
    async fn test_own_frame_and_pointers() {
        let (connector, server) = started().await;
        server
            .push_data(json!({"type": "pointer", "context": "color", "x": 4.0, "y": 2.0,
                              "time_stamp": 1.0, "device_id": "FooBar"}))
            .await;
        server
            .push_data(json!({"type": "pointer", "context": "grid", "row": 1, "column": 2,
                              "time_stamp": 2.0, "device_id": "FooBar"}))
            .await;
        settle().await;

        assert_eq!(connector.color_pointer().data.x, 4.0);
        assert_eq!(connector.grid_pointer().data.column, 2);
        assert_eq!(connector.pointer().time_stamp(), 2.0);
        assert_eq!(connector.pointer_data(&DeviceScope::All).len(), 2);
        assert_eq!(connector.color_pointer_data(&DeviceScope::All).len(), 1);
        assert_eq!(connector.grid_pointer_data(&DeviceScope::All).len(), 1);
    }

    #[tokio::test]
    async fn test_recording_and_cleaning() {
        let (connector, server) = started().await;
        server
            .push_data(json!({"type": "gyro", "alpha": 1.0, "time_stamp": 1.0, "device_id": "FooBar"}))
            .await;
        settle().await;
        assert_eq!(connector.gyro_data(&DeviceScope::All).len(), 1);

        connector.start_recording();
        assert!(connector.is_recording());
        assert!(connector.data_list().is_empty());

        for i in 0..200 {
            server
                .push_data(json!({"type": "gyro", "time_stamp": 10.0 + i as f64, "device_id": "FooBar"}))
                .await;
        }
        settle().await;
        assert_eq!(connector.gyro_data(&DeviceScope::All).len(), 200);

        connector.stop_recording();
        connector.clean_data();
        assert!(connector.data_list().is_empty());
        assert!(!connector.is_recording());
    }

    #[tokio::test]
    async fn test_device_accessors() {
        let (connector, server) = started().await;
        server
            .push(
                events::DEVICES,
                json!({"devices": [
                    {"device_id": "FooBar", "is_client": true, "device_nr": 0, "socket_id": "c1"},
                    {"device_id": "FooBar", "is_client": false, "device_nr": 1, "socket_id": SOCKET_ID},
                    {"device_id": "Other", "is_client": true, "device_nr": 2, "socket_id": "c2"}
                ]}),
            )
            .await;
        settle().await;

        assert_eq!(connector.device_count(), 3);
        assert_eq!(connector.client_count(), 2);
        assert_eq!(connector.client_devices().len(), 2);
        assert_eq!(connector.client_device().unwrap().socket_id, "c1");
        assert_eq!(connector.devices()[2].device_id, "Other");
    }
}
