// Provide a mapping for the controller GPIO pins

//
//| GPIO # | Name            | Description                                                 |
//| ------ | --------------- | ----------------------------------------------------------- |
//| 0      | RGBLED          | Data output for the SK6805 power LED.                       |
//| 1      | PWR_BTN_IN      | Input from the physical power button. Active low.           |
//| 2      | LID_OPEN        | Lid switch. High while the lid is open.                     |
//| 3      | LAN_WAKE_L      | LAN/WLAN wake request from the NIC. Active low.             |
//| 4      | PWRBTN_OUT_L    | PWRBTN# output to the PCH. Active low.                      |
//| 5      | ALW_EN          | Always-on 3.3 V / 5 V switches.                             |
//| 6      | DSW_PWROK_EN    | Deep-sleep well power-ok to the PCH.                        |
//| 7      | AUX_1V8_EN      | 1.8 V auxiliary rail enable.                                |
//| 8      | PCH_RSMRST_L    | Resume reset to the PCH. Active low.                        |
//| 9      | PSON_L          | ATX supply enable. Active low.                              |
//| 10     | EC_SLP_S3_L     | SLP_S3# pass-through to the board rails.                    |
//| 11     | EC_SLP_S3_PQ_L  | Second SLP_S3# pass-through to the VR.                      |
//| 12     | I2C0_SDA        | I2C0 data line to the side-band expander.                   |
//| 13     | I2C0_SCL        | I2C0 clock line to the side-band expander.                  |
//| 14     | I2C1_SDA        | I2C1 data line. The host is primary.                        |
//| 15     | I2C1_SCL        | I2C1 clock line. The host is primary.                       |
//| 16     | VCCST_PWRGD     | Sustain rail power-good to the CPU.                         |
//| 17     | PCH_PWRGD       | System power-ok to the PCH.                                 |
//| 18     | SYS_RESET_L     | Platform reset release. Active low.                         |
//| 19     | PWRGD_140MS     | Delayed power-good to the CPU.                              |
//| 20     | SLP_SUS_L       | SLP_SUS# from the PCH. Active low.                          |
//| 21     | SYSTEM_ALW_PG   | Power-good of the always-on rails.                          |
//| 22     | SLP_S3_L        | SLP_S3# from the PCH. Active low.                           |
//| 23     | SLP_S4_L        | SLP_S4# from the PCH. Active low.                           |
//| 24     | ATX_PG          | Power-good from the ATX supply.                             |
//| 25     | VCORE_EN        | Core VR enable readback.                                    |
//| 26     | VRMPWRGD        | Core VR power-good.                                         |
//| 27     | V3P3_SB_PGOOD   | 3.3 V standby power-good.                                   |
//| 28     | V12_S           | Analog: Scaled 12 V rail level.                             |
//| 29     | VIN_S           | Analog: Scaled DC input level.                              |
//
// Expander (PCA9555, port 0):
//
//| Pin | Name                | Description                                            |
//| --- | ------------------- | ------------------------------------------------------ |
//| 0   | USB_PWR_EN_L        | USB-A port power. Active low.                          |
//| 1   | FP_USB_EN_L         | Fingerprint keyboard port power. Active low.           |
//| 2   | USB_SWITCH_TO_HOST  | Fingerprint keyboard mux. High routes it to the host.  |
//| 3   | COMPANION_SLP       | SLP_S3/SLP_S5 pass-through to the companion MCU.       |
//| 4   | SIDEBAND_L          | PROCHOT# and NMI# release.                             |
//| 5   | EC_SLP_S5_L         | SLP_S5# pass-through.                                  |
//| 6   | EC_SLP_S4_L         | SLP_S4# pass-through.                                  |

use assign_resources::assign_resources;
use embassy_rp::peripherals;

assign_resources! {
  rgb_led: RGBLEDResources {
    dma_ch: DMA_CH0,
    pin: PIN_0,
    pio: PIO0,
  },
  i2cs: I2CSecondaryResources {
    sda: PIN_14,
    scl: PIN_15,
    i2c: I2C1,
  },
  power_button_input: PowerButtonInputResources {
    pin: PIN_1,
  },
  lid_input: LidInputResources {
    pin: PIN_2,
  },
  lan_wake_input: LanWakeInputResources {
    pin: PIN_3,
  },
  power_button: PowerButtonResources {
    pin: PIN_4,
  },
  rail_outputs: RailOutputResources {
    alw_en: PIN_5,
    dsw_pwrok_en: PIN_6,
    aux_1v8_en: PIN_7,
    pch_rsmrst_l: PIN_8,
    pson_l: PIN_9,
    ec_slp_s3_l: PIN_10,
    ec_slp_s3_pq_l: PIN_11,
    vccst_pwrgd: PIN_16,
    pch_pwrgd: PIN_17,
    sys_reset_l: PIN_18,
    pwrgd_140ms: PIN_19,
  },
  expander: ExpanderResources {
    sda: PIN_12,
    scl: PIN_13,
    i2c: I2C0,
  },
  signal_inputs: SignalInputResources {
    slp_sus_l: PIN_20,
    system_alw_pg: PIN_21,
    slp_s3_l: PIN_22,
    slp_s4_l: PIN_23,
    atx_pg: PIN_24,
    vcore_en: PIN_25,
    vrmpwrgd: PIN_26,
    v3p3_sb_pgood: PIN_27,
  },
  analog_inputs: AnalogInputResources {
    adc: ADC,
    v12_s: PIN_28,
    vin_s: PIN_29,
    temp_sensor: ADC_TEMP_SENSOR,
  },
}
