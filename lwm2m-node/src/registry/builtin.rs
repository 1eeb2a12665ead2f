//! Embedded definitions of the OMA core objects and IPSO 3303

use super::{ObjectDefinition, Operations as Op, ResourceDefinition};
use lwm2m_codec::ResourceType as T;

const SINGLE: bool = false;
const MULTIPLE: bool = true;
const MANDATORY: bool = true;
const OPTIONAL: bool = false;

type Row = (u16, &'static str, Op, bool, bool, T);

const SECURITY: &[Row] = &[
    (0, "LWM2M Server URI", Op::None, SINGLE, MANDATORY, T::String),
    (1, "Bootstrap-Server", Op::None, SINGLE, MANDATORY, T::Boolean),
    (2, "Security Mode", Op::None, SINGLE, MANDATORY, T::Integer),
    (3, "Public Key or Identity", Op::None, SINGLE, MANDATORY, T::Opaque),
    (4, "Server Public Key", Op::None, SINGLE, MANDATORY, T::Opaque),
    (5, "Secret Key", Op::None, SINGLE, MANDATORY, T::Opaque),
    (6, "SMS Security Mode", Op::None, SINGLE, OPTIONAL, T::Integer),
    (7, "SMS Binding Key Parameters", Op::None, SINGLE, OPTIONAL, T::Opaque),
    (8, "SMS Binding Secret Key(s)", Op::None, SINGLE, OPTIONAL, T::Opaque),
    (9, "LwM2M Server SMS Number", Op::None, SINGLE, OPTIONAL, T::String),
    (10, "Short Server ID", Op::None, SINGLE, OPTIONAL, T::Integer),
    (11, "Client Hold Off Time", Op::None, SINGLE, OPTIONAL, T::Integer),
    (12, "Bootstrap-Server Account Timeout", Op::None, SINGLE, OPTIONAL, T::Integer),
];

const SERVER: &[Row] = &[
    (0, "Short Server ID", Op::Read, SINGLE, MANDATORY, T::Integer),
    (1, "Lifetime", Op::ReadWrite, SINGLE, MANDATORY, T::Integer),
    (2, "Default Minimum Period", Op::ReadWrite, SINGLE, OPTIONAL, T::Integer),
    (3, "Default Maximum Period", Op::ReadWrite, SINGLE, OPTIONAL, T::Integer),
    (4, "Disable", Op::Execute, SINGLE, OPTIONAL, T::None),
    (5, "Disable Timeout", Op::ReadWrite, SINGLE, OPTIONAL, T::Integer),
    (6, "Notification Storing When Disabled or Offline", Op::ReadWrite, SINGLE, MANDATORY, T::Boolean),
    (7, "Binding", Op::ReadWrite, SINGLE, MANDATORY, T::String),
    (8, "Registration Update Trigger", Op::Execute, SINGLE, MANDATORY, T::None),
];

const ACCESS_CONTROL: &[Row] = &[
    (0, "Object ID", Op::Read, SINGLE, MANDATORY, T::Integer),
    (1, "Object Instance ID", Op::Read, SINGLE, MANDATORY, T::Integer),
    (2, "ACL", Op::ReadWrite, MULTIPLE, OPTIONAL, T::Integer),
    (3, "Access Control Owner", Op::ReadWrite, SINGLE, MANDATORY, T::Integer),
];

const DEVICE: &[Row] = &[
    (0, "Manufacturer", Op::Read, SINGLE, OPTIONAL, T::String),
    (1, "Model Number", Op::Read, SINGLE, OPTIONAL, T::String),
    (2, "Serial Number", Op::Read, SINGLE, OPTIONAL, T::String),
    (3, "Firmware Version", Op::Read, SINGLE, OPTIONAL, T::String),
    (4, "Reboot", Op::Execute, SINGLE, MANDATORY, T::None),
    (5, "Factory Reset", Op::Execute, SINGLE, OPTIONAL, T::None),
    (6, "Available Power Sources", Op::Read, MULTIPLE, OPTIONAL, T::Integer),
    (7, "Power Source Voltage", Op::Read, MULTIPLE, OPTIONAL, T::Integer),
    (8, "Power Source Current", Op::Read, MULTIPLE, OPTIONAL, T::Integer),
    (9, "Battery Level", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (10, "Memory Free", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (11, "Error Code", Op::Read, MULTIPLE, MANDATORY, T::Integer),
    (12, "Reset Error Code", Op::Execute, SINGLE, OPTIONAL, T::None),
    (13, "Current Time", Op::ReadWrite, SINGLE, OPTIONAL, T::Time),
    (14, "UTC Offset", Op::ReadWrite, SINGLE, OPTIONAL, T::String),
    (15, "Timezone", Op::ReadWrite, SINGLE, OPTIONAL, T::String),
    (16, "Supported Binding and Modes", Op::Read, SINGLE, MANDATORY, T::String),
    (17, "Device Type", Op::Read, SINGLE, OPTIONAL, T::String),
    (18, "Hardware Version", Op::Read, SINGLE, OPTIONAL, T::String),
    (19, "Software Version", Op::Read, SINGLE, OPTIONAL, T::String),
    (20, "Battery Status", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (21, "Memory Total", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (22, "ExtDevInfo", Op::Read, MULTIPLE, OPTIONAL, T::ObjectLink),
];

const CONNECTIVITY_MONITORING: &[Row] = &[
    (0, "Network Bearer", Op::Read, SINGLE, MANDATORY, T::Integer),
    (1, "Available Network Bearer", Op::Read, MULTIPLE, MANDATORY, T::Integer),
    (2, "Radio Signal Strength", Op::Read, SINGLE, MANDATORY, T::Integer),
    (3, "Link Quality", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (4, "IP Addresses", Op::Read, MULTIPLE, MANDATORY, T::String),
    (5, "Router IP Addresses", Op::Read, MULTIPLE, OPTIONAL, T::String),
    (6, "Link Utilization", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (7, "APN", Op::Read, MULTIPLE, OPTIONAL, T::String),
    (8, "Cell ID", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (9, "SMNC", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (10, "SMCC", Op::Read, SINGLE, OPTIONAL, T::Integer),
];

const FIRMWARE_UPDATE: &[Row] = &[
    (0, "Package", Op::Write, SINGLE, MANDATORY, T::Opaque),
    (1, "Package URI", Op::ReadWrite, SINGLE, MANDATORY, T::String),
    (2, "Update", Op::Execute, SINGLE, MANDATORY, T::None),
    (3, "State", Op::Read, SINGLE, MANDATORY, T::Integer),
    (5, "Update Result", Op::Read, SINGLE, MANDATORY, T::Integer),
    (6, "PkgName", Op::Read, SINGLE, OPTIONAL, T::String),
    (7, "PkgVersion", Op::Read, SINGLE, OPTIONAL, T::String),
    (8, "Firmware Update Protocol Support", Op::Read, MULTIPLE, OPTIONAL, T::Integer),
    (9, "Firmware Update Delivery Method", Op::Read, SINGLE, MANDATORY, T::Integer),
];

const LOCATION: &[Row] = &[
    (0, "Latitude", Op::Read, SINGLE, MANDATORY, T::Float),
    (1, "Longitude", Op::Read, SINGLE, MANDATORY, T::Float),
    (2, "Altitude", Op::Read, SINGLE, OPTIONAL, T::Float),
    (3, "Radius", Op::Read, SINGLE, OPTIONAL, T::Float),
    (4, "Velocity", Op::Read, SINGLE, OPTIONAL, T::Opaque),
    (5, "Timestamp", Op::Read, SINGLE, MANDATORY, T::Time),
    (6, "Speed", Op::Read, SINGLE, OPTIONAL, T::Float),
];

const CONNECTIVITY_STATISTICS: &[Row] = &[
    (0, "SMS Tx Counter", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (1, "SMS Rx Counter", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (2, "Tx Data", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (3, "Rx Data", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (4, "Max Message Size", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (5, "Average Message Size", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (6, "Start", Op::Execute, SINGLE, MANDATORY, T::None),
    (7, "Stop", Op::Execute, SINGLE, MANDATORY, T::None),
    (8, "Collection Period", Op::ReadWrite, SINGLE, OPTIONAL, T::Integer),
];

const TEMPERATURE: &[Row] = &[
    (5700, "Sensor Value", Op::Read, SINGLE, MANDATORY, T::Float),
    (5701, "Sensor Units", Op::Read, SINGLE, OPTIONAL, T::String),
    (5601, "Min Measured Value", Op::Read, SINGLE, OPTIONAL, T::Float),
    (5602, "Max Measured Value", Op::Read, SINGLE, OPTIONAL, T::Float),
    (5603, "Min Range Value", Op::Read, SINGLE, OPTIONAL, T::Float),
    (5604, "Max Range Value", Op::Read, SINGLE, OPTIONAL, T::Float),
    (5605, "Reset Min and Max Measured Values", Op::Execute, SINGLE, OPTIONAL, T::None),
    (5750, "Application Type", Op::ReadWrite, SINGLE, OPTIONAL, T::String),
    (5518, "Timestamp", Op::Read, SINGLE, OPTIONAL, T::Time),
    (6050, "Fractional Timestamp", Op::Read, SINGLE, OPTIONAL, T::Float),
    (6042, "Measurement Quality Indicator", Op::Read, SINGLE, OPTIONAL, T::Integer),
    (6049, "Measurement Quality Level", Op::Read, SINGLE, OPTIONAL, T::Integer),
];

fn object(id: u16, name: &str, multiple: bool, mandatory: bool, rows: &[Row]) -> ObjectDefinition {
    ObjectDefinition {
        id,
        name: name.to_string(),
        multiple,
        mandatory,
        resources: rows
            .iter()
            .map(|&(id, name, operations, multiple, mandatory, resource_type)| ResourceDefinition {
                id,
                name: name.to_string(),
                operations,
                multiple,
                mandatory,
                resource_type,
            })
            .collect(),
    }
}

pub(super) fn core_objects() -> Vec<ObjectDefinition> {
    vec![
        object(0, "LWM2M Security", MULTIPLE, MANDATORY, SECURITY),
        object(1, "LWM2M Server", MULTIPLE, MANDATORY, SERVER),
        object(2, "LWM2M Access Control", MULTIPLE, OPTIONAL, ACCESS_CONTROL),
        object(3, "Device", SINGLE, MANDATORY, DEVICE),
        object(4, "Connectivity Monitoring", SINGLE, OPTIONAL, CONNECTIVITY_MONITORING),
        object(5, "Firmware Update", SINGLE, OPTIONAL, FIRMWARE_UPDATE),
        object(6, "Location", SINGLE, OPTIONAL, LOCATION),
        object(7, "Connectivity Statistics", SINGLE, OPTIONAL, CONNECTIVITY_STATISTICS),
        object(3303, "Temperature", MULTIPLE, OPTIONAL, TEMPERATURE),
    ]
}
